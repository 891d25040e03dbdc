//! In-memory storage adapter.
//!
//! Backs the console driver and tests. All tables sit behind one
//! `RwLock`, so each port call is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    domain::{ChatId, GroupId, MemberKind, MessageId, UserId},
    errors::Error,
    ports::{ChatMessage, ChatRecord, ChatStore, GroupMemberRecord, GroupRecord, GroupStore},
    Result,
};

#[derive(Default)]
struct Tables {
    groups: HashMap<GroupId, GroupRecord>,
    members: HashMap<GroupId, BTreeMap<UserId, GroupMemberRecord>>,
    chats: HashMap<ChatId, ChatRecord>,
    messages: BTreeMap<(ChatId, MessageId), ChatMessage>,
    users: HashSet<UserId>,
    last_gid: i64,
    last_cid: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `uid` a known user (see [`GroupStore::has_users`]).
    pub async fn register_user(&self, uid: UserId) {
        self.tables.write().await.users.insert(uid);
    }

    /// Seed a group and its chat with an existing message counter.
    pub async fn seed_group(
        &self,
        gid: GroupId,
        cid: ChatId,
        name: &str,
        owner: UserId,
        current_mid: MessageId,
    ) -> GroupRecord {
        let mut t = self.tables.write().await;
        let record = GroupRecord {
            gid,
            chat_id: cid,
            name: name.to_string(),
            owner,
            created_at: Utc::now(),
        };
        t.groups.insert(gid, record.clone());
        t.chats.insert(
            cid,
            ChatRecord {
                cid,
                gid,
                current_mid,
            },
        );
        t.last_gid = t.last_gid.max(gid.0);
        t.last_cid = t.last_cid.max(cid.0);
        record
    }

    /// Messages of one chat, ordered by id.
    pub async fn messages(&self, cid: ChatId) -> Vec<ChatMessage> {
        self.tables
            .read()
            .await
            .messages
            .range((cid, MessageId(i64::MIN))..=(cid, MessageId(i64::MAX)))
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn load_chat(&self, cid: ChatId) -> Result<ChatRecord> {
        self.tables
            .read()
            .await
            .chats
            .get(&cid)
            .cloned()
            .ok_or(Error::ChatNotFound(cid))
    }

    async fn append_chat_message(&self, msg: &ChatMessage) -> Result<()> {
        let mut t = self.tables.write().await;
        let key = (msg.cid, msg.mid);
        if t.messages.contains_key(&key) {
            return Err(Error::DuplicateMessage {
                cid: msg.cid,
                mid: msg.mid,
            });
        }
        let chat = t
            .chats
            .get_mut(&msg.cid)
            .ok_or(Error::ChatNotFound(msg.cid))?;
        if msg.mid > chat.current_mid {
            chat.current_mid = msg.mid;
        }
        t.messages.insert(key, msg.clone());
        Ok(())
    }

    async fn next_message_id(&self, cid: ChatId) -> Result<MessageId> {
        self.load_chat(cid)
            .await?
            .current_mid
            .next()
            .ok_or(Error::SequenceExhausted(cid))
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn get_group(&self, gid: GroupId) -> Result<GroupRecord> {
        self.tables
            .read()
            .await
            .groups
            .get(&gid)
            .cloned()
            .ok_or(Error::GroupNotFound(gid))
    }

    async fn create_group(&self, name: &str, owner: UserId) -> Result<GroupRecord> {
        let mut t = self.tables.write().await;
        t.last_gid += 1;
        t.last_cid += 1;
        let gid = GroupId(t.last_gid);
        let cid = ChatId(t.last_cid);
        let record = GroupRecord {
            gid,
            chat_id: cid,
            name: name.to_string(),
            owner,
            created_at: Utc::now(),
        };
        t.groups.insert(gid, record.clone());
        t.chats.insert(
            cid,
            ChatRecord {
                cid,
                gid,
                current_mid: MessageId(0),
            },
        );
        Ok(record)
    }

    async fn get_members(&self, gid: GroupId) -> Result<Vec<GroupMemberRecord>> {
        let t = self.tables.read().await;
        if !t.groups.contains_key(&gid) {
            return Err(Error::GroupNotFound(gid));
        }
        Ok(t
            .members
            .get(&gid)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_members(
        &self,
        gid: GroupId,
        kind: MemberKind,
        uids: &[UserId],
    ) -> Result<Vec<GroupMemberRecord>> {
        let mut t = self.tables.write().await;
        if !t.groups.contains_key(&gid) {
            return Err(Error::GroupNotFound(gid));
        }
        let members = t.members.entry(gid).or_default();
        let mut added = Vec::new();
        for &uid in uids {
            if members.contains_key(&uid) {
                continue;
            }
            let record = GroupMemberRecord {
                gid,
                uid,
                kind,
                remark: String::new(),
            };
            members.insert(uid, record.clone());
            added.push(record);
        }
        Ok(added)
    }

    async fn remove_member(&self, gid: GroupId, uid: UserId) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.groups.contains_key(&gid) {
            return Err(Error::GroupNotFound(gid));
        }
        if let Some(members) = t.members.get_mut(&gid) {
            members.remove(&uid);
        }
        Ok(())
    }

    async fn has_users(&self, uids: &[UserId]) -> Result<bool> {
        let t = self.tables.read().await;
        Ok(uids.iter().all(|u| t.users.contains(u)))
    }
}

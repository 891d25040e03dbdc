use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::{
    domain::{ChatId, GroupId, MessageId, UserId},
    errors::Error,
    group::members::MemberSet,
    message::{actions, ChatEvent, GroupMessage, Message},
    ports::{ChatMessage, ChatStore, DeliveryChannel, GroupRecord},
    Result,
};

/// Next id to hand out in one chat.
///
/// Every live [`Group`] for the chat shares the same sequence, so a reloaded
/// group and a stale handle to the previous instance still take turns.
pub type ChatSequence = Arc<Mutex<MessageId>>;

/// One live chat group.
///
/// Message ingestion is single-writer per chat: id assignment, the durable
/// append, fan-out and the counter refresh all run under the chat's
/// sequence lock, so two concurrent senders can never be handed the same id.
/// The member set has its own short-lived lock and is never held across an
/// await.
pub struct Group {
    gid: GroupId,
    cid: ChatId,
    next_mid: ChatSequence,
    members: MemberSet,
    chats: Arc<dyn ChatStore>,
    delivery: Arc<dyn DeliveryChannel>,
}

impl Group {
    /// Build the live group from its persisted record with a sequence of its
    /// own. Fails when the chat record cannot be loaded; the caller must not
    /// use the group then.
    pub async fn load(
        record: &GroupRecord,
        chats: Arc<dyn ChatStore>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Result<Self> {
        Self::load_in_sequence(record, ChatSequence::default(), chats, delivery).await
    }

    /// Like [`Group::load`], but joins an existing chat sequence. The
    /// sequence only moves forward: it becomes the larger of its current
    /// value and the id after the stored counter.
    pub async fn load_in_sequence(
        record: &GroupRecord,
        sequence: ChatSequence,
        chats: Arc<dyn ChatStore>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Result<Self> {
        let chat = chats.load_chat(record.chat_id).await.map_err(|e| {
            error!(gid = %record.gid, cid = %record.chat_id, error = %e, "group chat not loadable");
            e
        })?;
        let stored_next = chat
            .current_mid
            .next()
            .ok_or(Error::SequenceExhausted(record.chat_id))?;

        {
            let mut next = sequence.lock().await;
            if stored_next > *next {
                *next = stored_next;
            }
        }

        Ok(Self {
            gid: record.gid,
            cid: record.chat_id,
            next_mid: sequence,
            members: MemberSet::new(),
            chats,
            delivery,
        })
    }

    pub fn gid(&self) -> GroupId {
        self.gid
    }

    pub fn cid(&self) -> ChatId {
        self.cid
    }

    pub fn put_member(&self, uid: UserId, flag: i32) {
        self.members.put(uid, flag);
    }

    pub fn remove_member(&self, uid: UserId) -> bool {
        self.members.remove(uid)
    }

    pub fn has_member(&self, uid: UserId) -> bool {
        self.members.contains(uid)
    }

    pub fn member_flag(&self, uid: UserId) -> Option<i32> {
        self.members.flag(uid)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> Vec<UserId> {
        self.members.snapshot()
    }

    /// Id the next ingested message will get.
    pub async fn next_message_id(&self) -> MessageId {
        *self.next_mid.lock().await
    }

    /// Persist a member's message and push it to every current member.
    ///
    /// A persistence failure aborts the whole call: nothing is delivered and
    /// the failure is only logged.
    pub async fn enqueue_message(&self, sender: UserId, msg: &GroupMessage) {
        let mut next = self.next_mid.lock().await;
        let mid = *next;

        let record = ChatMessage {
            cid: self.cid,
            mid,
            sender,
            message: msg.message.clone(),
            message_type: msg.message_type,
            send_at: Utc::now(),
        };
        if let Err(e) = self.chats.append_chat_message(&record).await {
            error!(gid = %self.gid, cid = %self.cid, %mid, %sender, error = %e, "persist group message failed");
            *next = self.refreshed_next_mid(*next).await;
            return;
        }

        let event = Message::notify(
            actions::CHAT_MESSAGE,
            ChatEvent {
                mid,
                cid: self.cid,
                sender,
                message_type: msg.message_type,
                message: msg.message.clone(),
                send_at: msg.send_at,
            },
        );
        self.send_message(&event).await;

        match mid.next() {
            Some(following) => *next = self.refreshed_next_mid(following).await,
            // Leaving the counter on `mid` makes every later append a duplicate.
            None => error!(gid = %self.gid, cid = %self.cid, %mid, "message id space exhausted"),
        }
    }

    /// Deliver an already built message to every current member. Nothing is
    /// persisted.
    pub async fn send_message(&self, message: &Message) {
        let members = self.members.snapshot();
        debug!(gid = %self.gid, action = %message.action, members = members.len(), "group fan-out");
        for uid in members {
            self.delivery.deliver(uid, message).await;
        }
    }

    /// Ask storage for the authoritative next id. Storage may only move the
    /// counter forward; `fallback` is used when it cannot answer.
    async fn refreshed_next_mid(&self, fallback: MessageId) -> MessageId {
        match self.chats.next_message_id(self.cid).await {
            Ok(id) if id >= fallback => id,
            Ok(id) => {
                warn!(gid = %self.gid, cid = %self.cid, stored = %id, local = %fallback, "stored message counter is behind");
                fallback
            }
            Err(e) => {
                warn!(gid = %self.gid, cid = %self.cid, error = %e, "message counter refresh failed");
                fallback
            }
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("gid", &self.gid)
            .field("cid", &self.cid)
            .field("members", &self.members.len())
            .finish_non_exhaustive()
    }
}

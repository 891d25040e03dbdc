use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    domain::{ChatId, GroupId, UserId},
    group::engine::{ChatSequence, Group},
    message::{GroupMessage, Message},
    ports::{ChatStore, DeliveryChannel, GroupStore},
    Result,
};

type Slot = Arc<OnceCell<Arc<Group>>>;

/// Process-wide table of live groups.
///
/// A group is created on first use: the first `get` for a gid loads its
/// record, chat counter and persisted members, and concurrent first callers
/// wait on that one load. Failed loads leave nothing behind, so the next
/// call retries. Groups stay live until [`GroupRegistry::evict`].
///
/// Message sequences are kept per chat and outlive eviction: a request that
/// still holds an evicted group keeps drawing ids from the same sequence as
/// the reloaded one.
pub struct GroupRegistry {
    slots: Mutex<HashMap<GroupId, Slot>>,
    sequences: Mutex<HashMap<ChatId, ChatSequence>>,
    groups: Arc<dyn GroupStore>,
    chats: Arc<dyn ChatStore>,
    delivery: Arc<dyn DeliveryChannel>,
}

impl GroupRegistry {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        chats: Arc<dyn ChatStore>,
        delivery: Arc<dyn DeliveryChannel>,
    ) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            sequences: Mutex::new(HashMap::new()),
            groups,
            chats,
            delivery,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<GroupId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sequence(&self, cid: ChatId) -> ChatSequence {
        self.sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(cid)
            .or_default()
            .clone()
    }

    pub async fn get(&self, gid: GroupId) -> Result<Arc<Group>> {
        let slot = self.slots().entry(gid).or_default().clone();

        match slot.get_or_try_init(|| self.load(gid)).await {
            Ok(group) => Ok(group.clone()),
            Err(e) => {
                let mut slots = self.slots();
                if let Some(current) = slots.get(&gid) {
                    if Arc::ptr_eq(current, &slot) && !current.initialized() {
                        slots.remove(&gid);
                    }
                }
                Err(e)
            }
        }
    }

    async fn load(&self, gid: GroupId) -> Result<Arc<Group>> {
        let record = self.groups.get_group(gid).await?;
        let group = Group::load_in_sequence(
            &record,
            self.sequence(record.chat_id),
            self.chats.clone(),
            self.delivery.clone(),
        )
        .await?;
        for member in self.groups.get_members(gid).await? {
            group.put_member(member.uid, super::SUBSCRIBED);
        }
        info!(%gid, cid = %group.cid(), members = group.member_count(), "group loaded");
        Ok(Arc::new(group))
    }

    /// Subscribe users to a group's pushes, inserting or overwriting flags.
    pub async fn put_members(&self, gid: GroupId, members: &HashMap<UserId, i32>) -> Result<()> {
        let group = self.get(gid).await?;
        for (&uid, &flag) in members {
            group.put_member(uid, flag);
        }
        Ok(())
    }

    pub async fn remove_member(&self, gid: GroupId, uid: UserId) -> Result<()> {
        let group = self.get(gid).await?;
        if !group.remove_member(uid) {
            debug!(%gid, %uid, "member was not subscribed");
        }
        Ok(())
    }

    pub async fn dispatch_message(
        &self,
        gid: GroupId,
        sender: UserId,
        msg: &GroupMessage,
    ) -> Result<()> {
        let group = self.get(gid).await?;
        group.enqueue_message(sender, msg).await;
        Ok(())
    }

    pub async fn dispatch_notify(&self, gid: GroupId, message: &Message) -> Result<()> {
        let group = self.get(gid).await?;
        group.send_message(message).await;
        Ok(())
    }

    /// Drop a live group. The next `get` reloads it from storage; its chat
    /// sequence is kept.
    pub fn evict(&self, gid: GroupId) -> bool {
        let removed = self.slots().remove(&gid).is_some();
        if removed {
            debug!(%gid, "group evicted");
        }
        removed
    }

    /// Ids of groups that are currently live.
    pub fn loaded(&self) -> Vec<GroupId> {
        let mut ids: Vec<_> = self
            .slots()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(gid, _)| *gid)
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, MemberKind, MessageId},
        errors::Error,
        ports::{GroupMemberRecord, GroupRecord},
        store::MemoryStore,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullDelivery;

    #[async_trait]
    impl DeliveryChannel for NullDelivery {
        async fn deliver(&self, _uid: UserId, _message: &Message) {}
    }

    /// Counts `get_group` calls and forwards everything to a MemoryStore.
    struct CountingGroups {
        inner: Arc<MemoryStore>,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl GroupStore for CountingGroups {
        async fn get_group(&self, gid: GroupId) -> Result<GroupRecord> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.get_group(gid).await
        }

        async fn create_group(&self, name: &str, owner: UserId) -> Result<GroupRecord> {
            self.inner.create_group(name, owner).await
        }

        async fn get_members(&self, gid: GroupId) -> Result<Vec<GroupMemberRecord>> {
            self.inner.get_members(gid).await
        }

        async fn add_members(
            &self,
            gid: GroupId,
            kind: MemberKind,
            uids: &[UserId],
        ) -> Result<Vec<GroupMemberRecord>> {
            self.inner.add_members(gid, kind, uids).await
        }

        async fn remove_member(&self, gid: GroupId, uid: UserId) -> Result<()> {
            self.inner.remove_member(gid, uid).await
        }

        async fn has_users(&self, uids: &[UserId]) -> Result<bool> {
            self.inner.has_users(uids).await
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<CountingGroups>, GroupRegistry) {
        let store = Arc::new(MemoryStore::new());
        store
            .seed_group(GroupId(7), ChatId(100), "g", UserId(1), MessageId(50))
            .await;
        store
            .add_members(GroupId(7), MemberKind::Admin, &[UserId(1)])
            .await
            .unwrap();
        store
            .add_members(GroupId(7), MemberKind::User, &[UserId(2)])
            .await
            .unwrap();
        let groups = Arc::new(CountingGroups {
            inner: store.clone(),
            loads: AtomicUsize::new(0),
        });
        let registry = GroupRegistry::new(groups.clone(), store.clone(), Arc::new(NullDelivery));
        (store, groups, registry)
    }

    #[tokio::test]
    async fn first_use_loads_members_from_storage() {
        let (_, _, registry) = setup().await;
        let group = registry.get(GroupId(7)).await.unwrap();
        assert_eq!(group.cid(), ChatId(100));
        assert!(group.has_member(UserId(1)));
        assert!(group.has_member(UserId(2)));
        assert_eq!(group.next_message_id().await, MessageId(51));
        assert_eq!(registry.loaded(), vec![GroupId(7)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_loads_once() {
        let (_, groups, registry) = setup().await;
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get(GroupId(7)).await.unwrap() })
            })
            .collect();
        let mut loaded = Vec::new();
        for t in tasks {
            loaded.push(t.await.unwrap());
        }

        assert_eq!(groups.loads.load(Ordering::SeqCst), 1);
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let (store, groups, registry) = setup().await;

        let err = registry.get(GroupId(8)).await.unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(GroupId(8))));
        assert!(registry.loaded().is_empty());

        store
            .seed_group(GroupId(8), ChatId(200), "late", UserId(1), MessageId(0))
            .await;
        registry.get(GroupId(8)).await.unwrap();
        assert_eq!(groups.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn evict_forces_reload() {
        let (_, groups, registry) = setup().await;
        let first = registry.get(GroupId(7)).await.unwrap();
        assert!(registry.evict(GroupId(7)));
        assert!(!registry.evict(GroupId(7)));

        let second = registry.get(GroupId(7)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(groups.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_handle_after_evict_keeps_the_chat_sequence() {
        let (store, _, registry) = setup().await;
        let stale = registry.get(GroupId(7)).await.unwrap();
        registry.evict(GroupId(7));
        let fresh = registry.get(GroupId(7)).await.unwrap();
        let msg = GroupMessage {
            message: "hi".to_string(),
            message_type: 1,
            send_at: 0,
        };

        fresh.enqueue_message(UserId(1), &msg).await;
        stale.enqueue_message(UserId(2), &msg).await;

        let msgs = store.messages(ChatId(100)).await;
        let mids: Vec<_> = msgs.iter().map(|m| m.mid).collect();
        assert_eq!(mids, vec![MessageId(51), MessageId(52)]);
        assert_eq!(msgs[1].sender, UserId(2));
        assert_eq!(fresh.next_message_id().await, MessageId(53));
    }

    #[tokio::test]
    async fn membership_edits_go_to_the_live_group() {
        let (_, _, registry) = setup().await;
        registry
            .put_members(GroupId(7), &HashMap::from([(UserId(3), 1)]))
            .await
            .unwrap();
        registry.remove_member(GroupId(7), UserId(1)).await.unwrap();

        let group = registry.get(GroupId(7)).await.unwrap();
        assert!(group.has_member(UserId(3)));
        assert!(!group.has_member(UserId(1)));
    }

    #[tokio::test]
    async fn dispatch_message_persists_through_the_group() {
        let (store, _, registry) = setup().await;
        registry
            .dispatch_message(
                GroupId(7),
                UserId(2),
                &GroupMessage {
                    message: "yo".to_string(),
                    message_type: 1,
                    send_at: 0,
                },
            )
            .await
            .unwrap();
        let msgs = store.messages(ChatId(100)).await;
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].mid, MessageId(51));
    }
}

//! Boundaries to the collaborators the core does not own: durable storage and
//! per-member delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, GroupId, MemberKind, MessageId, UserId},
    message::Message,
    Result,
};

/// Persisted chat metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub cid: ChatId,
    pub gid: GroupId,
    /// Highest message id persisted so far (0 for an empty chat).
    pub current_mid: MessageId,
}

/// Durable chat message. Append-only, keyed by `(cid, mid)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub cid: ChatId,
    pub mid: MessageId,
    pub sender: UserId,
    pub message: String,
    pub message_type: i32,
    pub send_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub gid: GroupId,
    pub chat_id: ChatId,
    pub name: String,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberRecord {
    pub gid: GroupId,
    pub uid: UserId,
    pub kind: MemberKind,
    #[serde(default)]
    pub remark: String,
}

/// Chat persistence used by the group engine.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn load_chat(&self, cid: ChatId) -> Result<ChatRecord>;

    /// Append one record. Must fail if `(cid, mid)` already exists.
    async fn append_chat_message(&self, msg: &ChatMessage) -> Result<()>;

    /// Authoritative id the next message of `cid` should get.
    async fn next_message_id(&self, cid: ChatId) -> Result<MessageId>;
}

/// Group and membership persistence used by the registry and the API handlers.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn get_group(&self, gid: GroupId) -> Result<GroupRecord>;

    /// Create a group together with its chat.
    async fn create_group(&self, name: &str, owner: UserId) -> Result<GroupRecord>;

    async fn get_members(&self, gid: GroupId) -> Result<Vec<GroupMemberRecord>>;

    /// Add members, returning the records that were created.
    async fn add_members(
        &self,
        gid: GroupId,
        kind: MemberKind,
        uids: &[UserId],
    ) -> Result<Vec<GroupMemberRecord>>;

    async fn remove_member(&self, gid: GroupId, uid: UserId) -> Result<()>;

    /// True when every uid names a known user.
    async fn has_users(&self, uids: &[UserId]) -> Result<bool>;
}

/// Per-member delivery primitive: enqueue and forget.
///
/// Implementations own their timeouts and retries; failures stay inside the
/// implementation.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver(&self, uid: UserId, message: &Message);
}

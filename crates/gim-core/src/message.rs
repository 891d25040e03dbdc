//! Message envelope exchanged with clients, plus the action names the core
//! pushes on its own.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ChatId, MessageId, UserId};

/// Sequence number of server-initiated pushes that expect no client-matched reply.
pub const NOTIFY_SEQ: i64 = -1;

pub mod actions {
    pub const CHAT_MESSAGE: &str = "message.chat";
    pub const SUCCESS: &str = "api.success";
    pub const FAILED: &str = "api.failed";
    pub const NOT_FOUND: &str = "api.not_found";
    pub const GROUP_ADD_MEMBER: &str = "group.add_member";
    pub const GROUP_REMOVE_MEMBER: &str = "group.remove_member";
    pub const GROUP_EXIT_MEMBER: &str = "group.exit_member";
}

/// Outbound (and inbound) envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub seq: i64,
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

impl Message {
    /// Build a message from any serializable body. A body that cannot be
    /// represented as JSON degrades to `null` rather than failing the push.
    pub fn new(seq: i64, action: impl Into<String>, data: impl Serialize) -> Self {
        let action = action.into();
        let data = serde_json::to_value(data).unwrap_or_else(|e| {
            tracing::warn!(%action, error = %e, "message body is not serializable");
            Value::Null
        });
        Self { seq, action, data }
    }

    pub fn notify(action: impl Into<String>, data: impl Serialize) -> Self {
        Self::new(NOTIFY_SEQ, action, data)
    }

    pub fn is_notify(&self) -> bool {
        self.seq == NOTIFY_SEQ
    }
}

/// An inbound client request as seen by the dispatcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub uid: UserId,
    #[serde(default)]
    pub seq: i64,
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

/// A chat message sent into a group by one of its members.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub message: String,
    #[serde(default)]
    pub message_type: i32,
    /// Client-side send time (unix millis).
    #[serde(default)]
    pub send_at: i64,
}

/// Body of a [`actions::CHAT_MESSAGE`] push.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub mid: MessageId,
    pub cid: ChatId,
    pub sender: UserId,
    pub message_type: i32,
    pub message: String,
    pub send_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notify_uses_sentinel_seq() {
        let m = Message::notify(actions::GROUP_ADD_MEMBER, json!({"gid": 1}));
        assert_eq!(m.seq, -1);
        assert!(m.is_notify());
        assert_eq!(m.data, json!({"gid": 1}));
    }

    #[test]
    fn request_defaults_missing_seq_and_data() {
        let r: Request = serde_json::from_str(r#"{"uid":3,"action":"group.join"}"#).unwrap();
        assert_eq!(r.uid, UserId(3));
        assert_eq!(r.seq, 0);
        assert!(r.data.is_null());
    }
}

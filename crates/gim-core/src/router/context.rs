use crate::{domain::UserId, message::NOTIFY_SEQ};

/// Per-request values handed to every handler as its first argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub uid: UserId,
    /// Client correlation number; [`NOTIFY_SEQ`] for server-initiated calls.
    pub seq: i64,
    pub action: String,
}

impl RequestContext {
    pub fn new(uid: UserId, seq: i64, action: impl Into<String>) -> Self {
        Self {
            uid,
            seq,
            action: action.into(),
        }
    }

    /// Context for a call the server makes on a user's behalf. Replies carry
    /// the push sentinel instead of a client sequence number.
    pub fn internal(uid: UserId, action: impl Into<String>) -> Self {
        Self::new(uid, NOTIFY_SEQ, action)
    }

    pub fn is_internal(&self) -> bool {
        self.seq == NOTIFY_SEQ
    }
}

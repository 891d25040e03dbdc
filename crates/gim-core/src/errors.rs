use crate::domain::{ChatId, GroupId, MessageId};

/// Core error type.
///
/// Adapters map their failures into this type so callers can tell a routing
/// miss apart from a storage failure or a rejected parameter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("route registration error: {0}")]
    Registration(String),

    #[error("no route matches")]
    NoRouteMatches,

    #[error("cannot decode {param}: {reason}")]
    Decode { param: &'static str, reason: String },

    #[error("invalid {param}: {reason}")]
    Invalid { param: &'static str, reason: String },

    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("chat {0} not found")]
    ChatNotFound(ChatId),

    #[error("message {mid} already exists in chat {cid}")]
    DuplicateMessage { cid: ChatId, mid: MessageId },

    #[error("message ids exhausted in chat {0}")]
    SequenceExhausted(ChatId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Business(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn business(msg: impl Into<String>) -> Self {
        Self::Business(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

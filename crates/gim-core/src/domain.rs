use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

numeric_id!(
    /// User id (numeric).
    UserId
);
numeric_id!(
    /// Group id (numeric).
    GroupId
);
numeric_id!(
    /// Chat id. Every group owns exactly one chat.
    ChatId
);
numeric_id!(
    /// Per-chat message id, strictly increasing within one chat.
    MessageId
);

impl MessageId {
    /// The id after this one, or `None` once the id space is used up.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

/// Role/subscription flag of a group member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum MemberKind {
    Admin,
    User,
}

impl MemberKind {
    pub fn flag(self) -> i32 {
        match self {
            MemberKind::Admin => 1,
            MemberKind::User => 2,
        }
    }
}

impl From<MemberKind> for i32 {
    fn from(k: MemberKind) -> Self {
        k.flag()
    }
}

impl TryFrom<i32> for MemberKind {
    type Error = String;

    fn try_from(v: i32) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(MemberKind::Admin),
            2 => Ok(MemberKind::User),
            other => Err(format!("unknown member kind {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_message_id_stops_at_the_top_of_the_range() {
        assert_eq!(MessageId(50).next(), Some(MessageId(51)));
        assert_eq!(MessageId(i64::MAX).next(), None);
    }
}

//! Live group state: member sets, message sequencing and fan-out.

pub mod engine;
pub mod members;
pub mod registry;

pub use engine::{ChatSequence, Group};
pub use members::MemberSet;
pub use registry::GroupRegistry;

/// Member-set flag for a user subscribed to group pushes.
pub const SUBSCRIBED: i32 = 1;

//! Group API: the handlers bound into the action tree.
//!
//! Handlers are thin glue over the storage ports and the group registry.
//! Every reply, success or failure, is pushed to the requester through the
//! delivery channel; the router never sees a return value.

pub mod handlers;
pub mod state;
pub mod types;

pub use handlers::{register, routes};
pub use state::ApiState;

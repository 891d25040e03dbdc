//! In-process core of the group IM server.
//!
//! Two pieces live here: the action router that resolves dotted action paths to
//! typed handlers, and the group engine that sequences, persists and fans out
//! group messages. Storage and delivery sit behind ports (traits) so the core
//! stays independent of any database or connection layer.

pub mod config;
pub mod domain;
pub mod errors;
pub mod group;
pub mod logging;
pub mod message;
pub mod ports;
pub mod router;
pub mod store;

pub use errors::{Error, Result};

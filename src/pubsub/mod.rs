//! Publish/Subscribe Module
//!
//! Fire-and-forget messaging between connections: nothing is stored, and a
//! message only reaches connections subscribed at the moment it is published.

pub mod registry;

pub use registry::{ConnectionId, Inbox, PubSub};

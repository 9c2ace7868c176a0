//! Persistence Module
//!
//! Durability for the keyspace: mutating commands are appended to a text
//! log and replayed at startup (see `commands::replay`).

pub mod aof;

pub use aof::{AppendOnlyLog, ReplayLines};

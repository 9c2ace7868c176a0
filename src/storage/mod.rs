//! Storage Engine Module
//!
//! This module provides the keyspace of FlintKV: a bounded string table with
//! per-key expiry, least-recently-used eviction and a background sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   Mutex<Keyspace>                                           │
//! │     ├── HashMap<String, Entry>   (value + deadline)         │
//! │     └── RecencyOrder             (LRU bookkeeping)          │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use flintkv::storage::Store;
//!
//! # tokio_test::block_on(async {
//! let store = Store::new(10_000);
//!
//! store.set("name", "Ariz").await;
//! assert_eq!(store.get("name").await.as_deref(), Some("Ariz"));
//!
//! assert_eq!(store.expire("name", 3600).await, Ok(true));
//! assert!(store.ttl("name").await > 0);
//! # });
//! ```

pub mod engine;
pub mod expiry;
pub mod lru;

pub use engine::{Entry, Keyspace, Store, StoreError};
pub use expiry::{ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use lru::RecencyOrder;

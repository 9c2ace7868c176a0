//! # FlintKV - A Small Redis-Style Key-Value Server
//!
//! FlintKV is an in-memory key-value server that speaks the RESP protocol.
//! It keeps a bounded string keyspace with per-key expiry and LRU eviction,
//! makes mutations durable through an append-only log, and supports
//! MULTI/EXEC transactions and publish/subscribe messaging.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlintKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │───┐              │
//! │  │ (serve)     │    │  Handler    │    │  Handler    │   │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘   │              │
//! │                            │                  │          ▼              │
//! │  ┌─────────────┐           │                  ▼    ┌─────────────┐      │
//! │  │   RESP      │           │           ┌──────────┐│ AppendOnly  │      │
//! │  │   Parser    │           │           │  Store   ││    Log      │      │
//! │  └─────────────┘           ▼           │ (Mutex)  │└─────────────┘      │
//! │                     ┌─────────────┐    └──────────┘       │             │
//! │                     │   PubSub    │          ▲            │ replay      │
//! │                     │  registry   │          └────────────┘ (startup)   │
//! │                     └─────────────┘          ▲                          │
//! │                                   ┌──────────┴──────────┐               │
//! │                                   │   ExpirySweeper     │               │
//! │                                   └─────────────────────┘               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flintkv::config::Config;
//! use flintkv::server::{serve, ServerContext};
//! use flintkv::storage::ExpirySweeper;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = Config::default();
//!
//!     // Build the store and replay the durability log
//!     let ctx = ServerContext::open(&config).await?;
//!
//!     // Start the background expiry sweeper
//!     let _sweeper = ExpirySweeper::start(Arc::clone(&ctx.store), config.cleanup_interval);
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     serve(listener, ctx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! ### Keyspace
//! - `PING`, `HELP`
//! - `SET key value...`, `GET key`, `DEL key`, `EXISTS key`
//! - `INCR key`
//! - `EXPIRE key seconds`, `TTL key`
//! - `KEYS`, `FLUSHALL`
//!
//! ### Transactions
//! - `MULTI`, `EXEC`, `DISCARD`
//!
//! ### Pub/Sub
//! - `SUBSCRIBE channel [channel ...]`
//! - `UNSUBSCRIBE [channel ...]`
//! - `PUBLISH channel message...`
//!
//! ### Connection
//! - `QUIT`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP protocol parser and types
//! - [`storage`]: Keyspace with expiry, LRU eviction and the sweeper
//! - [`persistence`]: Append-only durability log
//! - [`commands`]: Command execution and log replay
//! - [`pubsub`]: Channel registry
//! - [`connection`]: Per-client session handling
//! - [`server`]: Shared context and accept loop
//! - [`config`]: Command-line configuration
//!
//! ## Design Highlights
//!
//! ### One Exclusive Section
//!
//! All keyspace operations run under one `tokio::sync::Mutex`. A mutation's
//! log records are appended before the guard is released, so the log
//! replays in mutation order, and EXEC holds the guard for its whole batch.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: A background task periodically purges expired keys

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod pubsub;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, ConfigError, Invocation};
pub use connection::handle_connection;
pub use persistence::AppendOnlyLog;
pub use protocol::{ParseError, RespParser, RespValue};
pub use pubsub::PubSub;
pub use server::{serve, ServerContext};
pub use storage::{ExpirySweeper, Store};

/// The default port FlintKV listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host FlintKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlintKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Connection Handler Module
//!
//! This module manages individual client connections to FlintKV.
//! Each client connection is handled by its own async task, which owns the
//! connection's session state: the MULTI queue and its channel subscriptions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐  │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Session command │  │
//! │  └─────────────┘    └─────────────┘    │ or queue / exec │  │
//! │         ▲                              └────────┬────────┘  │
//! │         │ select!                               ▼           │
//! │  ┌─────────────┐                       ┌─────────────────┐  │
//! │  │ Inbox (pub) │──────────────────────>│   Send reply    │  │
//! │  └─────────────┘                       └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use flintkv::connection::handle_connection;
//! use flintkv::server::ServerContext;
//!
//! let ctx = ServerContext::open(&config).await?;
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, ctx.clone()));
//! ```

pub mod handler;
pub mod session;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
pub use session::{Session, TransactionState};

//! Command Handler Module
//!
//! This module implements the command processing layer for FlintKV.
//! It receives a command's tokens, executes them against the store, appends
//! the mutation to the durability log and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! │  - Log          │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐       ┌─────────────────┐
//! │     Store       │       │  AppendOnlyLog  │
//! └─────────────────┘       └────────┬────────┘
//!          ▲                         │
//!          └──────── replay() ◀──────┘  (at startup)
//! ```

pub mod handler;
pub mod replay;

pub use handler::{check_arity, check_min_arity, CommandError, CommandHandler};
pub use replay::{replay, ReplayStats};

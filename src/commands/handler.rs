//! Command Handler Module
//!
//! This module implements the keyspace commands of FlintKV. It receives a
//! command's tokens, runs it against the store and returns the reply.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `SET key value...` - Set a key (extra tokens are joined by spaces)
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key
//! - `EXISTS key` - Check if a key exists
//! - `INCR key` - Increment an integer value
//! - `EXPIRE key seconds` - Set expiry
//! - `TTL key` - Get remaining TTL
//! - `FLUSHALL` - Remove every key
//! - `KEYS` - List all keys
//! - `HELP` - Command summary
//!
//! Connection-level commands (MULTI/EXEC, pub/sub, QUIT) live in the
//! connection handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│  dispatch() │───>│   cmd_*()   │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │        holds the store lock                   │             │
//! │                                      ┌────────┴────────┐    │
//! │                                      ▼                 ▼    │
//! │                                   Keyspace     AppendOnlyLog │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A mutation and its log records happen under the same store guard, so the
//! log replays in exactly the order mutations were applied.

use crate::persistence::AppendOnlyLog;
use crate::protocol::RespValue;
use crate::storage::{Keyspace, Store, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

const HELP_TEXT: &str = "Commands: PING, SET key value, GET key, DEL key, EXISTS key, \
INCR key, EXPIRE key seconds, TTL key, FLUSHALL, KEYS, HELP, MULTI, EXEC, DISCARD, \
SUBSCRIBE channel [channel ...], UNSUBSCRIBE [channel ...], PUBLISH channel message, QUIT";

/// Errors reported to the client as `-ERR <message>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("EXEC without MULTI")]
    ExecWithoutMulti,

    /// An argument that must be an integer is not one
    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CommandError> for RespValue {
    fn from(e: CommandError) -> Self {
        RespValue::error(format!("ERR {e}"))
    }
}

/// Fails with `WrongArity` unless `tokens` holds exactly `expected` items.
pub fn check_arity(
    tokens: &[String],
    expected: usize,
    name: &'static str,
) -> Result<(), CommandError> {
    if tokens.len() == expected {
        Ok(())
    } else {
        Err(CommandError::WrongArity(name))
    }
}

/// Fails with `WrongArity` unless `tokens` holds at least `min` items.
pub fn check_min_arity(
    tokens: &[String],
    min: usize,
    name: &'static str,
) -> Result<(), CommandError> {
    if tokens.len() >= min {
        Ok(())
    } else {
        Err(CommandError::WrongArity(name))
    }
}

/// Handles keyspace commands by dispatching them to the appropriate handlers.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
    /// Durability log; `None` keeps the handler purely in-memory
    log: Option<Arc<AppendOnlyLog>>,
}

impl CommandHandler {
    /// Creates a new command handler with the given store and no log.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store, log: None }
    }

    /// Records every successful mutation to `log`.
    pub fn with_log(mut self, log: Arc<AppendOnlyLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn log(&self) -> Option<&Arc<AppendOnlyLog>> {
        self.log.as_ref()
    }

    /// Executes a command and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `tokens` - The command name followed by its arguments
    pub async fn execute(&self, tokens: &[String]) -> RespValue {
        let mut keyspace = self.store.lock().await;
        self.apply(&mut keyspace, tokens)
    }

    /// Executes a queued transaction.
    ///
    /// The store lock is held across the whole batch, so no other client's
    /// command runs between two commands of the queue. A failing command
    /// yields its error reply in place; the others still run.
    pub async fn execute_batch(&self, queue: &[Vec<String>]) -> RespValue {
        let mut keyspace = self.store.lock().await;
        let replies = queue
            .iter()
            .map(|tokens| self.apply(&mut keyspace, tokens))
            .collect();
        RespValue::array(replies)
    }

    /// Runs one command against an already locked keyspace.
    pub fn apply(&self, keyspace: &mut Keyspace, tokens: &[String]) -> RespValue {
        self.dispatch(keyspace, tokens)
            .unwrap_or_else(RespValue::from)
    }

    fn dispatch(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        let Some(name) = tokens.first() else {
            return Err(CommandError::Empty);
        };

        match name.to_uppercase().as_str() {
            "PING" => Ok(RespValue::pong()),
            "SET" => self.cmd_set(ks, tokens),
            "GET" => self.cmd_get(ks, tokens),
            "DEL" => self.cmd_del(ks, tokens),
            "EXISTS" => self.cmd_exists(ks, tokens),
            "INCR" => self.cmd_incr(ks, tokens),
            "EXPIRE" => self.cmd_expire(ks, tokens),
            "TTL" => self.cmd_ttl(ks, tokens),
            "FLUSHALL" => self.cmd_flushall(ks),
            "KEYS" => Ok(RespValue::string_array(ks.keys())),
            "HELP" => Ok(RespValue::bulk_string(HELP_TEXT)),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }

    /// Appends a record to the durability log, if there is one.
    ///
    /// A failed append is logged and otherwise ignored: the mutation already
    /// happened in memory.
    fn record(&self, line: &str) {
        let Some(log) = &self.log else {
            return;
        };
        if let Err(e) = log.append(line) {
            error!(
                error = %e,
                path = %log.path().display(),
                record = line,
                "Failed to append to durability log"
            );
        }
    }

    /// SET key value...
    fn cmd_set(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        check_min_arity(tokens, 3, "set")?;

        let key = &tokens[1];
        let value = tokens[2..].join(" ");
        let record = format!("SET {key} {value}");

        let evicted = ks.set(key, value);
        self.record(&record);
        for victim in &evicted {
            self.record(&format!("DEL {victim}"));
        }

        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        check_arity(tokens, 2, "get")?;
        Ok(ks.get(&tokens[1]).into())
    }

    /// DEL key
    fn cmd_del(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        check_arity(tokens, 2, "del")?;

        let key = &tokens[1];
        let removed = ks.delete(key);
        if removed {
            self.record(&format!("DEL {key}"));
        }
        Ok(RespValue::integer(i64::from(removed)))
    }

    /// EXISTS key
    fn cmd_exists(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        check_arity(tokens, 2, "exists")?;
        Ok(RespValue::integer(i64::from(ks.exists(&tokens[1]))))
    }

    /// INCR key
    fn cmd_incr(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        check_arity(tokens, 2, "incr")?;

        let key = &tokens[1];
        let (n, evicted) = ks.incr_evicting(key)?;
        self.record(&format!("INCR {key}"));
        for victim in &evicted {
            self.record(&format!("DEL {victim}"));
        }
        Ok(RespValue::integer(n))
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        check_arity(tokens, 3, "expire")?;

        let key = &tokens[1];
        let seconds: i64 = tokens[2].parse().map_err(|_| CommandError::NotInteger)?;

        let applied = ks.expire(key, seconds)?;
        if applied {
            self.record(&format!("EXPIRE {key} {seconds}"));
        }
        Ok(RespValue::integer(i64::from(applied)))
    }

    /// TTL key
    fn cmd_ttl(&self, ks: &mut Keyspace, tokens: &[String]) -> Result<RespValue, CommandError> {
        check_arity(tokens, 2, "ttl")?;
        Ok(RespValue::integer(ks.ttl(&tokens[1])))
    }

    /// FLUSHALL
    fn cmd_flushall(&self, ks: &mut Keyspace) -> Result<RespValue, CommandError> {
        ks.clear();
        self.record("FLUSHALL");
        Ok(RespValue::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(Store::default()))
    }

    fn create_logged_handler(max_keys: usize) -> (CommandHandler, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AppendOnlyLog::new(dir.path().join("appendonly.aof")));
        let handler = CommandHandler::new(Arc::new(Store::new(max_keys))).with_log(log);
        (handler, dir)
    }

    fn make_command(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn log_contents(dir: &TempDir) -> String {
        fs::read_to_string(dir.path().join("appendonly.aof")).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_ping() {
        let handler = create_handler();

        assert_eq!(handler.execute(&make_command(&["PING"])).await, RespValue::pong());
        assert_eq!(handler.execute(&make_command(&["ping"])).await, RespValue::pong());
    }

    #[tokio::test]
    async fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["SET", "key", "value"])).await;
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(&make_command(&["GET", "key"])).await;
        assert_eq!(response, RespValue::from("value"));
    }

    #[tokio::test]
    async fn test_set_joins_value_tokens() {
        let handler = create_handler();

        handler
            .execute(&make_command(&["SET", "greeting", "hello", "big", "world"]))
            .await;

        let response = handler.execute(&make_command(&["GET", "greeting"])).await;
        assert_eq!(response, RespValue::from("hello big world"));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["GET", "nonexistent"])).await;
        assert_eq!(response, RespValue::null());
    }

    #[tokio::test]
    async fn test_del_and_exists() {
        let handler = create_handler();

        handler.execute(&make_command(&["SET", "key1", "value1"])).await;

        let response = handler.execute(&make_command(&["EXISTS", "key1"])).await;
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(&make_command(&["DEL", "key1"])).await;
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(&make_command(&["DEL", "key1"])).await;
        assert_eq!(response, RespValue::integer(0));

        let response = handler.execute(&make_command(&["EXISTS", "key1"])).await;
        assert_eq!(response, RespValue::integer(0));
    }

    #[tokio::test]
    async fn test_incr() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["INCR", "counter"])).await;
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(&make_command(&["INCR", "counter"])).await;
        assert_eq!(response, RespValue::integer(2));

        handler.execute(&make_command(&["SET", "name", "Ariz"])).await;
        let response = handler.execute(&make_command(&["INCR", "name"])).await;
        assert_eq!(
            response,
            RespValue::error("ERR value is not an integer or out of range")
        );
    }

    #[tokio::test]
    async fn test_expire_and_ttl() {
        let handler = create_handler();

        handler.execute(&make_command(&["SET", "a", "1"])).await;

        let response = handler.execute(&make_command(&["TTL", "a"])).await;
        assert_eq!(response, RespValue::integer(-1));

        let response = handler.execute(&make_command(&["EXPIRE", "a", "5"])).await;
        assert_eq!(response, RespValue::integer(1));

        let RespValue::Integer(ttl) = handler.execute(&make_command(&["TTL", "a"])).await else {
            panic!("TTL must reply with an integer");
        };
        assert!((0..=5).contains(&ttl));

        let response = handler.execute(&make_command(&["EXPIRE", "missing", "5"])).await;
        assert_eq!(response, RespValue::integer(0));

        let response = handler.execute(&make_command(&["TTL", "missing"])).await;
        assert_eq!(response, RespValue::integer(-2));

        let response = handler.execute(&make_command(&["EXPIRE", "a", "soon"])).await;
        assert_eq!(
            response,
            RespValue::error("ERR value is not an integer or out of range")
        );
    }

    #[tokio::test]
    async fn test_flushall_and_keys() {
        let handler = create_handler();

        handler.execute(&make_command(&["SET", "b", "1"])).await;
        handler.execute(&make_command(&["SET", "a", "2"])).await;

        let response = handler.execute(&make_command(&["KEYS"])).await;
        assert_eq!(response, RespValue::string_array(["a", "b"]));

        let response = handler.execute(&make_command(&["FLUSHALL"])).await;
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(&make_command(&["KEYS"])).await;
        assert_eq!(response, RespValue::array(vec![]));
    }

    #[tokio::test]
    async fn test_help() {
        let handler = create_handler();

        let RespValue::BulkString(text) = handler.execute(&make_command(&["HELP"])).await else {
            panic!("HELP must reply with a bulk string");
        };
        let text = String::from_utf8_lossy(&text);
        for name in ["PING", "SET", "EXPIRE", "MULTI", "PUBLISH"] {
            assert!(text.contains(name), "{name} missing from help");
        }
    }

    #[tokio::test]
    async fn test_wrong_arity() {
        let handler = create_handler();

        let cases: [(&[&str], &str); 5] = [
            (&["SET", "key"], "set"),
            (&["GET"], "get"),
            (&["DEL", "a", "b"], "del"),
            (&["INCR"], "incr"),
            (&["EXPIRE", "a"], "expire"),
        ];

        for (command, name) in cases {
            let response = handler.execute(&make_command(command)).await;
            assert_eq!(
                response,
                RespValue::error(format!(
                    "ERR wrong number of arguments for '{name}' command"
                ))
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_and_empty_command() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["nosuch", "x"])).await;
        assert_eq!(response, RespValue::error("ERR unknown command 'NOSUCH'"));

        let response = handler.execute(&[]).await;
        assert_eq!(response, RespValue::error("ERR empty command"));
    }

    #[tokio::test]
    async fn test_batch_keeps_going_after_error() {
        let handler = create_handler();
        handler.execute(&make_command(&["SET", "b", "text"])).await;

        let queue = vec![make_command(&["SET", "a", "1"]), make_command(&["INCR", "b"])];
        let response = handler.execute_batch(&queue).await;

        assert_eq!(
            response,
            RespValue::array(vec![
                RespValue::ok(),
                RespValue::error("ERR value is not an integer or out of range"),
            ])
        );
        assert_eq!(
            handler.execute(&make_command(&["GET", "a"])).await,
            RespValue::from("1")
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let handler = create_handler();
        assert_eq!(handler.execute_batch(&[]).await, RespValue::array(vec![]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_is_not_interleaved() {
        let handler = create_handler();

        let mut writers = vec![];
        for _ in 0..4 {
            let handler = handler.clone();
            writers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    handler.execute(&make_command(&["SET", "k", "x"])).await;
                    tokio::task::yield_now().await;
                }
            }));
        }

        let queue = vec![
            make_command(&["SET", "k", "1"]),
            make_command(&["INCR", "k"]),
            make_command(&["INCR", "k"]),
        ];
        for _ in 0..100 {
            let response = handler.execute_batch(&queue).await;
            assert_eq!(
                response,
                RespValue::array(vec![
                    RespValue::ok(),
                    RespValue::integer(2),
                    RespValue::integer(3),
                ])
            );
            tokio::task::yield_now().await;
        }

        for writer in writers {
            writer.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_mutations_are_logged() {
        let (handler, dir) = create_logged_handler(0);

        handler.execute(&make_command(&["SET", "a", "hello", "world"])).await;
        handler.execute(&make_command(&["INCR", "n"])).await;
        handler.execute(&make_command(&["EXPIRE", "a", "100"])).await;
        handler.execute(&make_command(&["DEL", "n"])).await;
        handler.execute(&make_command(&["FLUSHALL"])).await;

        assert_eq!(
            log_contents(&dir),
            "SET a hello world\nINCR n\nEXPIRE a 100\nDEL n\nFLUSHALL\n"
        );
    }

    #[tokio::test]
    async fn test_reads_and_noops_are_not_logged() {
        let (handler, dir) = create_logged_handler(0);

        handler.execute(&make_command(&["GET", "a"])).await;
        handler.execute(&make_command(&["EXISTS", "a"])).await;
        handler.execute(&make_command(&["TTL", "a"])).await;
        handler.execute(&make_command(&["KEYS"])).await;
        handler.execute(&make_command(&["DEL", "missing"])).await;
        handler.execute(&make_command(&["EXPIRE", "missing", "10"])).await;

        handler.execute(&make_command(&["SET", "word", "abc"])).await;
        handler.execute(&make_command(&["INCR", "word"])).await;

        assert_eq!(log_contents(&dir), "SET word abc\n");
    }

    #[tokio::test]
    async fn test_eviction_is_logged_as_del() {
        let (handler, dir) = create_logged_handler(2);

        handler.execute(&make_command(&["SET", "a", "1"])).await;
        handler.execute(&make_command(&["SET", "b", "2"])).await;
        handler.execute(&make_command(&["SET", "c", "3"])).await;

        assert_eq!(log_contents(&dir), "SET a 1\nSET b 2\nSET c 3\nDEL a\n");
        assert_eq!(
            handler.execute(&make_command(&["GET", "a"])).await,
            RespValue::null()
        );
    }

    #[tokio::test]
    async fn test_incr_create_eviction_is_logged_as_del() {
        let (handler, dir) = create_logged_handler(2);

        handler.execute(&make_command(&["SET", "a", "1"])).await;
        handler.execute(&make_command(&["SET", "b", "2"])).await;
        handler.execute(&make_command(&["INCR", "a"])).await;
        handler.execute(&make_command(&["INCR", "n"])).await;

        assert_eq!(
            log_contents(&dir),
            "SET a 1\nSET b 2\nINCR a\nINCR n\nDEL b\n"
        );
    }
}

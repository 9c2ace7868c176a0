//! Keyspace with Expiry and LRU Eviction
//!
//! This module implements the core storage engine for FlintKV.
//!
//! ## Design Decisions
//!
//! 1. **One exclusive section**: the whole keyspace sits behind a single
//!    `tokio::sync::Mutex`. Every operation holds it for its full duration, so
//!    compound operations (set-then-evict, read-modify-write INCR) are atomic
//!    with respect to each other.
//! 2. **Lazy + eager expiry**: keys are checked on access, and `cleanup`,
//!    `keys` and `ttl` purge eagerly.
//! 3. **Bounded size**: when `max_keys` is non-zero, inserts evict the least
//!    recently touched keys until the table fits again.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │   ┌─────────────────────── Mutex ───────────────────────┐   │
//! │   │                      Keyspace                       │   │
//! │   │   HashMap<String, Entry>      RecencyOrder          │   │
//! │   └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The command layer takes the guard through [`Store::lock`] when it needs a
//! mutation and its log append to happen inside the same section.

use crate::storage::lru::RecencyOrder;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

/// Errors a keyspace operation can report.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// INCR on a value that is not a base-10 `i64`
    #[error("value is not an integer or out of range")]
    NotInteger,

    /// INCR past `i64::MAX`
    #[error("increment or decrement would overflow")]
    Overflow,

    /// EXPIRE with a deadline the clock cannot represent
    #[error("invalid expire time in 'expire' command")]
    InvalidExpire,
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: String) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Checks if this entry has expired at the given instant.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// The key table and its recency order.
///
/// Only reachable through a [`Store`] guard (or directly in single-owner
/// settings such as benchmarks). The underlying structures stay private so
/// that the table and the order can never drift apart.
#[derive(Debug)]
pub struct Keyspace {
    data: HashMap<String, Entry>,
    recency: RecencyOrder,
    /// 0 = unbounded
    max_keys: usize,
    /// Set while replaying the log, whose DEL records decide evictions
    eviction_paused: bool,
}

impl Keyspace {
    /// Creates an empty keyspace. `max_keys == 0` disables eviction.
    pub fn new(max_keys: usize) -> Self {
        Self {
            data: HashMap::new(),
            recency: RecencyOrder::new(),
            max_keys,
            eviction_paused: false,
        }
    }

    /// Resolves a key for access: purges it if expired, otherwise marks it
    /// as most recently used and hands out the live entry.
    fn resolve(&mut self, key: &str) -> Option<&mut Entry> {
        if self.data.get(key)?.is_expired_at(Instant::now()) {
            self.remove_key(key);
            return None;
        }

        self.recency.touch(key);
        self.data.get_mut(key)
    }

    fn remove_key(&mut self, key: &str) -> bool {
        self.recency.remove(key);
        self.data.remove(key).is_some()
    }

    /// Evicts from the cold end until the table fits the limit.
    fn evict_overflow(&mut self) -> Vec<String> {
        if self.eviction_paused {
            return Vec::new();
        }
        self.trim_to_limit()
    }

    /// Evicts least recently used keys until the table fits `max_keys`,
    /// regardless of whether eviction is paused.
    pub(crate) fn trim_to_limit(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        if self.max_keys == 0 {
            return evicted;
        }

        while self.data.len() > self.max_keys {
            let Some(oldest) = self.recency.pop_oldest() else {
                break;
            };
            if self.data.remove(&oldest).is_some() {
                evicted.push(oldest);
            }
        }

        evicted
    }

    /// Pauses or resumes eviction on insert. Reads do not reach the log, so
    /// while replaying the recency order differs from the live one and only
    /// the recorded DELs may remove keys.
    pub(crate) fn pause_eviction(&mut self, paused: bool) {
        self.eviction_paused = paused;
    }

    fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .data
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_key(key);
        }

        expired.len()
    }

    /// Sets a key to a value, dropping any previous expiry.
    ///
    /// # Returns
    ///
    /// The keys evicted to make room, least recently used first.
    pub fn set(&mut self, key: &str, value: String) -> Vec<String> {
        self.data.insert(key.to_string(), Entry::new(value));
        self.recency.touch(key);
        self.evict_overflow()
    }

    /// Gets the value for a key, or `None` if absent or expired.
    pub fn get(&mut self, key: &str) -> Option<String> {
        self.resolve(key).map(|entry| entry.value.clone())
    }

    /// Deletes a key. Returns `true` if something was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.resolve(key).is_some() && self.remove_key(key)
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&mut self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    /// Increments an integer value by 1.
    ///
    /// A missing key is created as `"1"`, which may evict cold keys like
    /// [`Keyspace::set`] does. An existing key keeps its expiry. The stored
    /// value is left untouched on error.
    pub fn incr(&mut self, key: &str) -> Result<i64, StoreError> {
        self.incr_evicting(key).map(|(n, _)| n)
    }

    /// Like [`Keyspace::incr`], also returning the keys evicted when the
    /// increment created the key.
    pub fn incr_evicting(&mut self, key: &str) -> Result<(i64, Vec<String>), StoreError> {
        if let Some(entry) = self.resolve(key) {
            let current: i64 = entry.value.parse().map_err(|_| StoreError::NotInteger)?;
            let next = current.checked_add(1).ok_or(StoreError::Overflow)?;
            entry.value = next.to_string();
            return Ok((next, Vec::new()));
        }

        self.data.insert(key.to_string(), Entry::new("1".to_string()));
        self.recency.touch(key);
        Ok((1, self.evict_overflow()))
    }

    /// Sets an expiry on an existing key, `seconds` from now.
    ///
    /// Negative values are clamped to 0, which expires the key immediately.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the expiry was set, `Ok(false)` if the key doesn't exist.
    pub fn expire(&mut self, key: &str, seconds: i64) -> Result<bool, StoreError> {
        let seconds = u64::try_from(seconds).unwrap_or(0);
        self.expire_after(key, Duration::from_secs(seconds))
    }

    pub(crate) fn expire_after(&mut self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let Some(entry) = self.resolve(key) else {
            return Ok(false);
        };
        let deadline = Instant::now()
            .checked_add(ttl)
            .ok_or(StoreError::InvalidExpire)?;
        entry.expires_at = Some(deadline);
        Ok(true)
    }

    /// Gets the remaining TTL for a key in whole seconds.
    ///
    /// # Returns
    ///
    /// - `-2` if the key doesn't exist
    /// - `-1` if the key exists but has no expiry
    /// - the remaining seconds otherwise
    pub fn ttl(&mut self, key: &str) -> i64 {
        let Some(entry) = self.resolve(key) else {
            return -2;
        };
        let Some(deadline) = entry.expires_at else {
            return -1;
        };

        match deadline.checked_duration_since(Instant::now()) {
            Some(remaining) => i64::try_from(remaining.as_secs()).unwrap_or(i64::MAX),
            None => {
                self.remove_key(key);
                -2
            }
        }
    }

    /// Removes every key. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.data.len();
        self.data.clear();
        self.recency.clear();
        removed
    }

    /// Returns all live keys in lexicographic order.
    pub fn keys(&mut self) -> Vec<String> {
        self.purge_expired();
        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Purges every expired key. Returns how many were purged.
    pub fn cleanup(&mut self) -> usize {
        self.purge_expired()
    }

    /// Returns the number of keys held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The shared storage engine.
///
/// Designed to be wrapped in an `Arc` and shared by every connection and the
/// expiry sweeper.
///
/// # Example
///
/// ```
/// use flintkv::storage::Store;
///
/// # tokio_test::block_on(async {
/// let store = Store::new(2);
///
/// store.set("a", "1").await;
/// store.set("b", "2").await;
/// assert_eq!(store.get("a").await.as_deref(), Some("1"));
///
/// // "b" is now the least recently used key
/// assert_eq!(store.set("c", "3").await, vec!["b".to_string()]);
/// # });
/// ```
#[derive(Debug)]
pub struct Store {
    keyspace: Mutex<Keyspace>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Store {
    /// Creates a store holding at most `max_keys` keys (0 = unbounded).
    pub fn new(max_keys: usize) -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::new(max_keys)),
        }
    }

    /// Enters the store's exclusive section.
    pub async fn lock(&self) -> MutexGuard<'_, Keyspace> {
        self.keyspace.lock().await
    }

    pub async fn set(&self, key: &str, value: impl Into<String>) -> Vec<String> {
        self.lock().await.set(key, value.into())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.lock().await.get(key)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.lock().await.delete(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.lock().await.exists(key)
    }

    pub async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.lock().await.incr(key)
    }

    pub async fn expire(&self, key: &str, seconds: i64) -> Result<bool, StoreError> {
        self.lock().await.expire(key, seconds)
    }

    pub async fn ttl(&self, key: &str) -> i64 {
        self.lock().await.ttl(key)
    }

    pub async fn clear(&self) -> usize {
        self.lock().await.clear()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.lock().await.keys()
    }

    /// Purges expired keys; this is what the background sweeper calls.
    pub async fn cleanup(&self) -> usize {
        self.lock().await.cleanup()
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Asserts that the table and the recency order track the same keys.
    fn assert_consistent(ks: &Keyspace) {
        assert_eq!(ks.data.len(), ks.recency.len());
        for key in ks.data.keys() {
            assert!(ks.recency.contains(key), "{key} missing from recency order");
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut ks = Keyspace::new(0);
        assert!(ks.set("name", "Ariz".to_string()).is_empty());
        assert_eq!(ks.get("name").as_deref(), Some("Ariz"));
        assert_consistent(&ks);
    }

    #[test]
    fn test_get_nonexistent() {
        let mut ks = Keyspace::new(0);
        assert_eq!(ks.get("missing"), None);
    }

    #[test]
    fn test_set_clears_expiry() {
        let mut ks = Keyspace::new(0);
        ks.set("k", "v".to_string());
        assert_eq!(ks.expire("k", 100), Ok(true));
        ks.set("k", "w".to_string());
        assert_eq!(ks.ttl("k"), -1);
    }

    #[test]
    fn test_delete() {
        let mut ks = Keyspace::new(0);
        ks.set("key", "value".to_string());

        assert!(ks.delete("key"));
        assert!(!ks.delete("key"));
        assert_eq!(ks.get("key"), None);
        assert_consistent(&ks);
    }

    #[test]
    fn test_exists() {
        let mut ks = Keyspace::new(0);
        ks.set("key", "value".to_string());

        assert!(ks.exists("key"));
        assert!(!ks.exists("other"));
    }

    #[test]
    fn test_expire_zero_expires_immediately() {
        let mut ks = Keyspace::new(0);
        ks.set("k", "v".to_string());

        assert_eq!(ks.expire("k", 0), Ok(true));
        assert_eq!(ks.get("k"), None);
        assert!(!ks.exists("k"));
        assert_eq!(ks.ttl("k"), -2);
        assert!(ks.is_empty());
        assert_consistent(&ks);
    }

    #[test]
    fn test_expire_negative_is_clamped() {
        let mut ks = Keyspace::new(0);
        ks.set("k", "v".to_string());

        assert_eq!(ks.expire("k", -10), Ok(true));
        assert!(!ks.exists("k"));
    }

    #[test]
    fn test_expire_missing_key() {
        let mut ks = Keyspace::new(0);
        assert_eq!(ks.expire("missing", 10), Ok(false));
        assert_eq!(ks.expire("missing", i64::MAX), Ok(false));
    }

    #[test]
    fn test_expire_unrepresentable_deadline() {
        let mut ks = Keyspace::new(0);
        ks.set("k", "v".to_string());
        assert_eq!(ks.expire("k", i64::MAX), Err(StoreError::InvalidExpire));
        assert_eq!(ks.ttl("k"), -1);
    }

    #[test]
    fn test_ttl() {
        let mut ks = Keyspace::new(0);

        assert_eq!(ks.ttl("missing"), -2);

        ks.set("persistent", "v".to_string());
        assert_eq!(ks.ttl("persistent"), -1);

        ks.set("volatile", "v".to_string());
        ks.expire("volatile", 5).unwrap();
        let ttl = ks.ttl("volatile");
        assert!((0..=5).contains(&ttl), "ttl was {ttl}");
    }

    #[test]
    fn test_lazy_expiry() {
        let mut ks = Keyspace::new(0);
        ks.set("k", "v".to_string());
        ks.expire_after("k", Duration::from_millis(20)).unwrap();

        assert_eq!(ks.get("k").as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(ks.get("k"), None);
        assert!(ks.is_empty());
        assert_consistent(&ks);
    }

    #[test]
    fn test_incr() {
        let mut ks = Keyspace::new(0);

        assert_eq!(ks.incr("counter"), Ok(1));
        assert_eq!(ks.get("counter").as_deref(), Some("1"));
        assert_eq!(ks.incr("counter"), Ok(2));

        ks.set("negative", "-5".to_string());
        assert_eq!(ks.incr("negative"), Ok(-4));
    }

    #[test]
    fn test_incr_not_integer_leaves_value() {
        let mut ks = Keyspace::new(0);
        ks.set("name", "hello world".to_string());

        assert_eq!(ks.incr("name"), Err(StoreError::NotInteger));
        assert_eq!(ks.get("name").as_deref(), Some("hello world"));
    }

    #[test]
    fn test_incr_overflow() {
        let mut ks = Keyspace::new(0);
        ks.set("big", i64::MAX.to_string());

        assert_eq!(ks.incr("big"), Err(StoreError::Overflow));
        assert_eq!(ks.get("big"), Some(i64::MAX.to_string()));
    }

    #[test]
    fn test_incr_preserves_expiry() {
        let mut ks = Keyspace::new(0);
        ks.set("n", "1".to_string());
        ks.expire("n", 100).unwrap();

        assert_eq!(ks.incr("n"), Ok(2));
        assert!(ks.ttl("n") >= 0);
    }

    #[test]
    fn test_incr_after_expiry_starts_over() {
        let mut ks = Keyspace::new(0);
        ks.set("n", "41".to_string());
        ks.expire("n", 0).unwrap();

        assert_eq!(ks.incr("n"), Ok(1));
        assert_eq!(ks.ttl("n"), -1);
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut ks = Keyspace::new(3);
        ks.set("a", "1".to_string());
        ks.set("b", "2".to_string());
        ks.set("c", "3".to_string());

        // Reading "a" makes "b" the coldest key
        ks.get("a");
        assert_eq!(ks.set("d", "4".to_string()), vec!["b".to_string()]);

        assert_eq!(ks.len(), 3);
        assert!(!ks.exists("b"));
        assert_eq!(ks.keys(), vec!["a", "c", "d"]);
        assert_consistent(&ks);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let mut ks = Keyspace::new(2);
        ks.set("a", "1".to_string());
        ks.set("b", "2".to_string());

        assert!(ks.set("a", "3".to_string()).is_empty());
        assert_eq!(ks.len(), 2);
    }

    #[test]
    fn test_incr_create_evicts() {
        let mut ks = Keyspace::new(1);
        ks.set("a", "1".to_string());

        assert_eq!(ks.incr("b"), Ok(1));
        assert_eq!(ks.keys(), vec!["b"]);
        assert_consistent(&ks);
    }

    #[test]
    fn test_incr_evicting_reports_victims() {
        let mut ks = Keyspace::new(2);
        ks.set("a", "1".to_string());
        ks.set("b", "2".to_string());

        assert_eq!(ks.incr_evicting("a"), Ok((2, vec![])));
        assert_eq!(ks.incr_evicting("c"), Ok((1, vec!["b".to_string()])));
        assert_eq!(ks.keys(), vec!["a", "c"]);
    }

    #[test]
    fn test_paused_eviction_then_trim() {
        let mut ks = Keyspace::new(2);
        ks.pause_eviction(true);
        for key in ["a", "b", "c"] {
            assert!(ks.set(key, "v".to_string()).is_empty());
        }
        assert_eq!(ks.incr_evicting("d"), Ok((1, vec![])));
        assert_eq!(ks.len(), 4);

        ks.pause_eviction(false);
        assert_eq!(ks.trim_to_limit(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ks.keys(), vec!["c", "d"]);
        assert_consistent(&ks);
    }

    #[test]
    fn test_unbounded() {
        let mut ks = Keyspace::new(0);
        for i in 0..1000 {
            assert!(ks.set(&format!("key{i}"), "v".to_string()).is_empty());
        }
        assert_eq!(ks.len(), 1000);
    }

    #[test]
    fn test_keys_sorted_and_live() {
        let mut ks = Keyspace::new(0);
        ks.set("b", "1".to_string());
        ks.set("a", "1".to_string());
        ks.set("c", "1".to_string());
        ks.set("gone", "1".to_string());
        ks.expire("gone", 0).unwrap();

        assert_eq!(ks.keys(), vec!["a", "b", "c"]);
        assert_eq!(ks.len(), 3);
        assert_consistent(&ks);
    }

    #[test]
    fn test_clear() {
        let mut ks = Keyspace::new(0);
        ks.set("key1", "value1".to_string());
        ks.set("key2", "value2".to_string());

        assert_eq!(ks.clear(), 2);
        assert!(ks.is_empty());
        assert_eq!(ks.clear(), 0);
        assert_consistent(&ks);
    }

    #[test]
    fn test_cleanup_expired() {
        let mut ks = Keyspace::new(0);
        ks.set("key1", "value1".to_string());
        ks.set("key2", "value2".to_string());
        ks.set("key3", "value3".to_string());
        ks.expire_after("key1", Duration::from_millis(10)).unwrap();
        ks.expire_after("key2", Duration::from_millis(10)).unwrap();

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(ks.cleanup(), 2);
        assert_eq!(ks.len(), 1);
        assert!(ks.exists("key3"));
        assert_consistent(&ks);
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = Store::default();

        store.set("k", "v").await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert!(store.exists("k").await);
        assert_eq!(store.incr("n").await, Ok(1));
        assert_eq!(store.expire("k", 10).await, Ok(true));
        assert!(store.ttl("k").await >= 0);
        assert_eq!(store.keys().await, vec!["k", "n"]);
        assert!(store.delete("n").await);
        assert_eq!(store.cleanup().await, 0);
        assert_eq!(store.clear().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expire_scenario() {
        let store = Store::default();
        store.set("a", "1").await;
        assert_eq!(store.expire("a", 1).await, Ok(true));

        let ttl = store.ttl("a").await;
        assert!((0..=1).contains(&ttl), "ttl was {ttl}");

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.get("a").await, None);
        assert!(!store.exists("a").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_incr_is_atomic() {
        let store = Arc::new(Store::default());
        let mut handles = vec![];

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    store.incr("counter").await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("counter").await.as_deref(), Some("2000"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sets_respect_limit() {
        let store = Arc::new(Store::new(50));
        let mut handles = vec![];

        for t in 0..4 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    store.set(&format!("key-{t}-{i}"), "value").await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 50);
        assert_consistent(&*store.lock().await);
    }
}

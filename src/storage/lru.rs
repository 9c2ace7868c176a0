//! Recency Order
//!
//! Tracks keys from least to most recently touched so the keyspace can evict
//! from the cold end when it grows past its limit.
//!
//! Every touch stamps the key with a fresh, strictly increasing tick. The
//! ordered `ticks` map gives the coldest key in O(log n) and the `positions`
//! map finds a key's current tick for re-stamping or removal.

use std::collections::{BTreeMap, HashMap};

/// Least-to-most-recently-touched ordering of keys.
///
/// Each key appears at most once.
#[derive(Debug, Default)]
pub struct RecencyOrder {
    /// Tick -> key, oldest first
    ticks: BTreeMap<u64, String>,
    /// Key -> its current tick
    positions: HashMap<String, u64>,
    /// Next tick to hand out
    clock: u64,
}

impl RecencyOrder {
    /// Creates an empty order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a key as most recently used, inserting it if it is not tracked.
    pub fn touch(&mut self, key: &str) {
        let tick = self.clock;
        self.clock += 1;

        match self.positions.get_mut(key) {
            Some(previous) => {
                self.ticks.remove(previous);
                *previous = tick;
            }
            None => {
                self.positions.insert(key.to_string(), tick);
            }
        }
        self.ticks.insert(tick, key.to_string());
    }

    /// Stops tracking a key. Returns whether it was tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.positions.remove(key) {
            Some(tick) => {
                self.ticks.remove(&tick);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the least recently used key.
    pub fn pop_oldest(&mut self) -> Option<String> {
        let (_, key) = self.ticks.pop_first()?;
        self.positions.remove(&key);
        Some(key)
    }

    /// Returns the least recently used key without removing it.
    #[cfg(test)]
    pub fn peek_oldest(&self) -> Option<&str> {
        self.ticks.values().next().map(String::as_str)
    }

    /// Forgets every key.
    pub fn clear(&mut self) {
        self.ticks.clear();
        self.positions.clear();
    }

    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }
}

//! Log Replay
//!
//! Rebuilds the keyspace at startup by re-applying the durability log.
//! Records are interpreted leniently: a malformed or unknown record is
//! skipped, and a failing INCR or EXPIRE is ignored, so a damaged history
//! never blocks startup. Only an I/O failure while reading aborts.
//!
//! Eviction is paused while records are applied. Reads never reach the log,
//! so the recency order rebuilt here is not the one the server had; the DEL
//! records written for each eviction decide which keys left. Once the log
//! is consumed the keyspace is trimmed to its limit, which only removes keys
//! when the limit shrank between runs, and those removals are logged too.

use crate::persistence::AppendOnlyLog;
use crate::storage::{Keyspace, Store};
use std::io;
use tracing::{debug, error, info};

/// Outcome of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records that were recognised and applied
    pub applied: usize,
    /// Records that were malformed or unknown
    pub skipped: usize,
    /// Keys evicted after replay to fit a smaller key limit
    pub trimmed: usize,
}

/// Replays `log` into `store`, holding the store lock throughout.
pub async fn replay(store: &Store, log: &AppendOnlyLog) -> io::Result<ReplayStats> {
    let mut keyspace = store.lock().await;
    let mut stats = ReplayStats::default();

    keyspace.pause_eviction(true);
    let applied = apply_lines(&mut keyspace, log, &mut stats);
    keyspace.pause_eviction(false);
    applied?;

    let trimmed = keyspace.trim_to_limit();
    stats.trimmed = trimmed.len();
    for victim in &trimmed {
        if let Err(e) = log.append(&format!("DEL {victim}")) {
            error!(error = %e, key = %victim, "Failed to log eviction after replay");
        }
    }

    info!(
        path = %log.path().display(),
        applied = stats.applied,
        skipped = stats.skipped,
        trimmed = stats.trimmed,
        keys = keyspace.len(),
        "Durability log replayed"
    );

    Ok(stats)
}

fn apply_lines(ks: &mut Keyspace, log: &AppendOnlyLog, stats: &mut ReplayStats) -> io::Result<()> {
    for line in log.replay_lines()? {
        let line = line?;
        if apply_record(ks, &line) {
            stats.applied += 1;
        } else {
            debug!(record = %line, "Skipping unrecognised log record");
            stats.skipped += 1;
        }
    }
    Ok(())
}

/// Applies one record. Returns `false` if the record was not recognised.
fn apply_record(ks: &mut Keyspace, line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(name) = tokens.first() else {
        return false;
    };

    match (name.to_uppercase().as_str(), tokens.len()) {
        ("SET", n) if n >= 3 => {
            ks.set(tokens[1], tokens[2..].join(" "));
        }
        ("DEL", 2) => {
            ks.delete(tokens[1]);
        }
        ("INCR", 2) => {
            let _ = ks.incr(tokens[1]);
        }
        ("EXPIRE", 3) => {
            if let Ok(seconds) = tokens[2].parse::<i64>() {
                let _ = ks.expire(tokens[1], seconds);
            }
        }
        ("FLUSHALL", _) => {
            ks.clear();
        }
        _ => return false,
    }

    true
}

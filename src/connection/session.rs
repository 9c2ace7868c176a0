//! Per-connection state: the transaction queue and channel subscriptions.

use std::collections::BTreeSet;

/// Where a connection stands with respect to MULTI/EXEC.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum TransactionState {
    #[default]
    Idle,
    /// Inside MULTI; commands are queued instead of executed
    Queuing(Vec<Vec<String>>),
}

/// State owned by a single connection.
#[derive(Debug, Default)]
pub struct Session {
    transaction: TransactionState,
    /// Kept sorted so UNSUBSCRIBE without arguments replies in a stable order
    subscriptions: BTreeSet<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters queuing mode, dropping anything a previous MULTI left behind.
    pub fn begin(&mut self) {
        self.transaction = TransactionState::Queuing(Vec::new());
    }

    /// Leaves queuing mode and drops the queue.
    pub fn discard(&mut self) {
        self.transaction = TransactionState::Idle;
    }

    /// Queues a command. Ignored when not inside a transaction.
    pub fn enqueue(&mut self, tokens: Vec<String>) {
        if let TransactionState::Queuing(queue) = &mut self.transaction {
            queue.push(tokens);
        }
    }

    /// Leaves queuing mode and hands back the queue, or `None` when idle.
    pub fn take_queue(&mut self) -> Option<Vec<Vec<String>>> {
        match std::mem::take(&mut self.transaction) {
            TransactionState::Queuing(queue) => Some(queue),
            TransactionState::Idle => None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.transaction, TransactionState::Queuing(_))
    }

    /// Records a subscription and returns the new subscription count.
    pub fn add_subscription(&mut self, channel: &str) -> usize {
        self.subscriptions.insert(channel.to_string());
        self.subscriptions.len()
    }

    /// Forgets a subscription and returns the remaining count.
    pub fn remove_subscription(&mut self, channel: &str) -> usize {
        self.subscriptions.remove(channel);
        self.subscriptions.len()
    }

    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscriptions
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

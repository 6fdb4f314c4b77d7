use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Why a ranged read stopped before reaching its upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The item limit was reached.
    Limited,
    /// The caller cancelled the query.
    Cancelled,
    /// The query ran past its deadline.
    DeadlineExceeded,
}

/// Partial or complete result of a ranged read.
///
/// `last_key` is the last position the read covered. When `interruption` is
/// set, issuing the same read again starting right after `last_key` returns
/// the remaining items.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, K> {
    pub items: Vec<T>,
    pub last_key: Option<K>,
    pub interruption: Option<Interruption>,
}

impl<T, K> Page<T, K> {
    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Cancellation and deadline for one query.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Keeps the earlier of the current deadline and `now + timeout`.
    pub fn capped(&self, timeout: Duration) -> Self {
        let cap = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(self.deadline.map_or(cap, |d| d.min(cap))),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn check(&self) -> Option<Interruption> {
        if self.cancel.is_cancelled() {
            Some(Interruption::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Interruption::DeadlineExceeded)
        } else {
            None
        }
    }
}

//! Per-query deadline and cancellation.
//!
//! Providers may be slow (remote embedding lookups), so every provider call
//! is gated on the query's budget. Once the budget is spent the remaining
//! pairs are scored as unavailable and the ranker returns what it has.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Deadline plus cancellation for one query.
#[derive(Debug, Clone, Default)]
pub struct QueryBudget {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl QueryBudget {
    /// No deadline, never cancelled unless a token is attached.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: CancelToken::new(),
        }
    }

    /// Budget from an optional timeout.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::unlimited, Self::with_timeout)
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_exhausted(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_is_never_exhausted() {
        assert!(!QueryBudget::unlimited().is_exhausted());
        assert!(!QueryBudget::from_timeout(None).is_exhausted());
    }

    #[test]
    fn test_zero_timeout_is_exhausted() {
        assert!(QueryBudget::with_timeout(Duration::ZERO).is_exhausted());
    }

    #[test]
    fn test_generous_timeout_is_not_exhausted() {
        assert!(!QueryBudget::with_timeout(Duration::from_secs(3600)).is_exhausted());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let budget = QueryBudget::unlimited().with_cancel(token.clone());
        assert!(!budget.is_exhausted());
        token.cancel();
        assert!(budget.is_exhausted());
        assert!(budget.cancel_token().is_cancelled());
    }
}

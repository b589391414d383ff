//! Cancellation and deadline shared by everything working on one scan

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cloneable handle that reports whether a scan should stop
///
/// Clones share the cancellation flag, so cancelling any clone stops every
/// worker. A deadline, when set, trips the context once it passes.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that trips `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Same flag, plus a deadline that is the earlier of the existing one and
    /// `timeout` from now
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(existing), Some(new)) => Some(existing.min(new)),
            (existing, new) => existing.or(new),
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let ctx = ScanContext::new();
        let worker = ctx.clone();
        assert!(!worker.is_cancelled());
        ctx.cancel();
        assert!(worker.is_cancelled());
    }

    #[test]
    fn test_elapsed_deadline_trips_context() {
        let ctx = ScanContext::with_timeout(Duration::ZERO);
        assert!(ctx.is_cancelled());
        assert!(!ScanContext::with_timeout(Duration::from_secs(3600)).is_cancelled());
    }

    #[test]
    fn test_child_keeps_earlier_deadline_and_flag() {
        let parent = ScanContext::with_timeout(Duration::ZERO);
        let child = parent.child_with_timeout(Duration::from_secs(3600));
        assert!(child.is_cancelled());

        let parent = ScanContext::new();
        let child = parent.child_with_timeout(Duration::from_secs(3600));
        parent.cancel();
        assert!(child.is_cancelled());
    }
}

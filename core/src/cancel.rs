//! Cooperative cancellation of a relay run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Granularity of [`CancelToken::sleep`].
const SLEEP_STEP: Duration = Duration::from_millis(50);

/// A shared flag checked by the relay at every point where it may block.
///
/// Clones share the same flag, so one clone can be handed to a signal handler
/// while the other is passed to [`Relay::run`](crate::Relay::run).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Default::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early when cancelled.
    /// Returns `false` if the sleep was interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;

        loop {
            if self.is_cancelled() {
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }

            sleep(SLEEP_STEP.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let handle = token.clone();

        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_interrupted() {
        let token = CancelToken::new();
        token.cancel();

        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_completes() {
        assert!(CancelToken::new().sleep(Duration::from_millis(10)));
    }
}

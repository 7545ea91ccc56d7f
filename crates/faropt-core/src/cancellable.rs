//! Cancellation for blocking poll loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity at which a sleeping poller notices cancellation.
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(100);

/// Cancellation token shared between a poll loop and whoever may stop it.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a cancellable operation
#[derive(Debug)]
pub enum CancellableResult<T> {
    Completed(T),
    Cancelled,
}

impl<T> CancellableResult<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancellableResult::Cancelled)
    }

    /// Convert to Result, mapping Cancelled to the given error.
    pub fn into_result<E>(self, cancelled: impl FnOnce() -> E) -> Result<T, E> {
        match self {
            CancellableResult::Completed(value) => Ok(value),
            CancellableResult::Cancelled => Err(cancelled()),
        }
    }
}

/// Utility for cancellable polling operations
pub struct CancellablePoller {
    cancellation_token: CancellationToken,
    poll_interval: Duration,
}

impl CancellablePoller {
    /// Create a new cancellable poller with default 100ms interval
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            poll_interval: CANCEL_CHECK_SLICE,
        }
    }

    pub fn with_interval(cancellation_token: CancellationToken, interval: Duration) -> Self {
        Self {
            cancellation_token,
            poll_interval: interval,
        }
    }

    /// Poll a closure until it returns Some(value) or cancellation is requested
    ///
    /// The closure should return:
    /// - `Some(value)` when the operation is complete
    /// - `None` when the operation should continue polling
    pub fn poll_until<T, F>(&self, mut check_fn: F) -> CancellableResult<T>
    where
        F: FnMut() -> Option<T>,
    {
        loop {
            if self.cancellation_token.is_cancelled() {
                return CancellableResult::Cancelled;
            }

            if let Some(result) = check_fn() {
                return CancellableResult::Completed(result);
            }

            if !self.sleep() {
                return CancellableResult::Cancelled;
            }
        }
    }

    /// Sleep for one poll interval. Returns false if cancelled in the meantime.
    fn sleep(&self) -> bool {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            if self.cancellation_token.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(CANCEL_CHECK_SLICE.min(deadline - now));
        }
    }
}

//! Tracking of asynchronous operations started on behalf of an exchange.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts asynchronous operations still running for an exchange.
///
/// The exchange is not finished until every started operation has completed,
/// even when the completion lands on another task.
#[derive(Debug, Clone, Default)]
pub struct FlightTracker {
    inner: Arc<FlightInner>,
}

#[derive(Debug, Default)]
struct FlightInner {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl FlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an operation as started. It completes when the guard drops.
    pub fn start(&self) -> FlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        FlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no operation is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Completion marker for one asynchronous operation.
#[derive(Debug)]
pub struct FlightGuard {
    inner: Arc<FlightInner>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

//! Counting completion signal for bridging callbacks to blocking callers.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::context::IoContext;

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Woken,
    TimedOut,
}

impl WaitOutcome {
    pub fn timed_out(self) -> bool {
        self == WaitOutcome::TimedOut
    }
}

/// Each [`wake`](Waiter::wake) banks one permit; each wait consumes one.
///
/// Wakes that arrive before anyone waits are kept, so two completions followed
/// by two waits never block.
#[derive(Debug, Clone)]
pub struct Waiter {
    permits: Arc<Semaphore>,
    handle: Handle,
}

impl Waiter {
    pub fn new(ctx: &IoContext) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            handle: ctx.handle(),
        }
    }

    /// Non-blocking; safe to call from endpoint callbacks.
    pub fn wake(&self) {
        self.permits.add_permits(1);
    }

    /// Block until one wake is available and consume it.
    pub fn wait(&self) {
        let permits = self.permits.clone();
        self.handle.block_on(async move {
            // The semaphore is never closed, so acquire only fails if that changes.
            if let Ok(permit) = permits.acquire().await {
                permit.forget();
            }
        });
    }

    /// Like [`wait`](Waiter::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let permits = self.permits.clone();
        self.handle.block_on(async move {
            match tokio::time::timeout(timeout, permits.acquire()).await {
                Ok(Ok(permit)) => {
                    permit.forget();
                    WaitOutcome::Woken
                }
                Ok(Err(_closed)) => WaitOutcome::Woken,
                Err(_elapsed) => WaitOutcome::TimedOut,
            }
        })
    }

    /// Number of wakes not yet consumed.
    pub fn pending(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wakes_before_wait_are_banked() {
        let ctx = IoContext::new().unwrap();
        let waiter = Waiter::new(&ctx);
        waiter.wake();
        waiter.wake();
        assert_eq!(waiter.pending(), 2);
        assert_eq!(
            waiter.wait_timeout(Duration::from_millis(10)),
            WaitOutcome::Woken
        );
        waiter.wait();
        assert_eq!(waiter.pending(), 0);
    }

    #[test]
    fn wait_timeout_expires_without_wake() {
        let ctx = IoContext::new().unwrap();
        let waiter = Waiter::new(&ctx);
        let started = Instant::now();
        let outcome = waiter.wait_timeout(Duration::from_millis(50));
        assert!(outcome.timed_out());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn wake_from_runtime_task_releases_blocked_caller() {
        let ctx = IoContext::new().unwrap();
        let waiter = Waiter::new(&ctx);
        let remote = waiter.clone();
        ctx.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.wake();
        });
        assert_eq!(
            waiter.wait_timeout(Duration::from_secs(5)),
            WaitOutcome::Woken
        );
    }
}

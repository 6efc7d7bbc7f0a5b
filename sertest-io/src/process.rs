use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Child;

use crate::context::IoContext;
use crate::error::{io_err, EndpointError};

/// Shared handle to the subprocess behind a `stdio` endpoint.
///
/// Exit is tracked explicitly: once the child has been reaped its pid is
/// never signalled again.
#[derive(Clone)]
pub struct ChildProcess {
    inner: Arc<ChildInner>,
}

struct ChildInner {
    pid: u32,
    child: Mutex<Child>,
    status: Mutex<Option<ExitStatus>>,
    ctx: IoContext,
}

impl ChildProcess {
    pub(crate) fn new(ctx: IoContext, pid: u32, child: Child) -> Self {
        Self {
            inner: Arc::new(ChildInner {
                pid,
                child: Mutex::new(child),
                status: Mutex::new(None),
                ctx,
            }),
        }
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Exit status, if the child has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *lock(&self.inner.status)
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Deliver `sig` to the child.
    pub fn signal(&self, sig: Signal) -> Result<(), EndpointError> {
        // Recorded exits are checked under the status lock, so a kill never
        // follows a reap that another caller has already recorded.
        let status = lock(&self.inner.status);
        if status.is_some() {
            return Err(EndpointError::ProcessExited {
                pid: self.inner.pid,
            });
        }
        tracing::debug!(pid = self.inner.pid, signal = %sig, "signalling child");
        kill(Pid::from_raw(self.inner.pid as i32), sig).map_err(|source| EndpointError::Signal {
            pid: self.inner.pid,
            signal: sig,
            source,
        })
    }

    /// Reap the child if it has exited, without blocking.
    ///
    /// While another thread is inside [`wait_timeout`](Self::wait_timeout)
    /// this reports the last known status instead of waiting for that call.
    pub fn try_wait(&self) -> Result<Option<ExitStatus>, EndpointError> {
        if let Some(done) = self.exit_status() {
            return Ok(Some(done));
        }
        let mut child = match self.inner.child.try_lock() {
            Ok(child) => child,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(self.exit_status()),
        };
        let reaped = child
            .try_wait()
            .map_err(|e| io_err(format!("pid {}", self.inner.pid), e))?;
        drop(child);
        Ok(self.record_exit(reaped))
    }

    /// Wait up to `timeout` for the child to exit. `Ok(None)` means it is
    /// still running.
    ///
    /// Only one `wait_timeout` runs at a time; concurrent callers queue behind
    /// it. [`signal`](Self::signal) and [`try_wait`](Self::try_wait) never wait
    /// on it.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<ExitStatus>, EndpointError> {
        if let Some(done) = self.exit_status() {
            return Ok(Some(done));
        }
        let waited = {
            let mut child = lock(&self.inner.child);
            self.inner
                .ctx
                .block_on(async { tokio::time::timeout(timeout, child.wait()).await })
        };
        match waited {
            Ok(Ok(exit)) => Ok(self.record_exit(Some(exit))),
            Ok(Err(err)) => Err(io_err(format!("pid {}", self.inner.pid), err)),
            Err(_elapsed) => Ok(self.exit_status()),
        }
    }

    fn record_exit(&self, reaped: Option<ExitStatus>) -> Option<ExitStatus> {
        let mut status = lock(&self.inner.status);
        if let (None, Some(exit)) = (*status, reaped) {
            tracing::debug!(pid = self.inner.pid, status = %exit, "child exited");
            *status = Some(exit);
        }
        *status
    }
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("pid", &self.inner.pid)
            .field("status", &self.exit_status())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Stream comparison/transfer handler.
//!
//! A [`StreamHandler`] owns one endpoint and turns its callbacks into two
//! independent jobs: comparing inbound bytes against an expected buffer, and
//! pushing an outbound buffer in chunks. Completion of either job, a close, or
//! a fault wakes the handler's [`Waiter`]; the blocking caller then collects
//! the result with [`StreamHandler::wait`] or [`StreamHandler::wait_timeout`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sertest_io::{
    Endpoint, EndpointError, EndpointEvents, IoContext, IoControl, ReadFlags, WaitOutcome, Waiter,
};

use crate::defaults::DEFAULT_CHUNK_SIZE;
use crate::error::HarnessError;
use crate::trace::Printable;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Outbound transfer in flight. `offset <= data.len()`.
#[derive(Debug)]
struct PendingWrite {
    data: Vec<u8>,
    offset: usize,
}

/// Inbound comparison in flight. `matched <= expected.len()`.
#[derive(Debug)]
struct PendingCompare {
    expected: Vec<u8>,
    matched: usize,
}

#[derive(Debug)]
struct HandlerState {
    to_write: Option<PendingWrite>,
    to_compare: Option<PendingCompare>,
    ignore_input: bool,
    chunk_size: usize,
    fault: Option<HarnessError>,
    closed: bool,
}

impl HandlerState {
    fn new(chunk_size: usize) -> Self {
        Self {
            to_write: None,
            to_compare: None,
            ignore_input: false,
            chunk_size: chunk_size.max(1),
            fault: None,
            closed: false,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<HandlerState>,
    waiter: Waiter,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// StreamHandler
// ---------------------------------------------------------------------------

/// Test-side handle binding one endpoint to compare/transfer state.
///
/// Clones share the endpoint, the state and the waiter.
#[derive(Debug, Clone)]
pub struct StreamHandler {
    name: String,
    endpoint: Endpoint,
    shared: Arc<Shared>,
}

impl StreamHandler {
    /// Create a handler and its (unopened) endpoint for connection string `spec`.
    ///
    /// `name` defaults to the connection string.
    pub fn new(
        ctx: &IoContext,
        spec: &str,
        bufsize: usize,
        name: Option<&str>,
    ) -> Result<Self, HarnessError> {
        let name = name.unwrap_or(spec).to_string();
        let shared = Arc::new(Shared {
            state: Mutex::new(HandlerState::new(DEFAULT_CHUNK_SIZE)),
            waiter: Waiter::new(ctx),
        });
        let events = HandlerEvents {
            name: name.clone(),
            shared: shared.clone(),
        };
        let endpoint = Endpoint::new(ctx, spec, bufsize, Box::new(events))?;
        Ok(Self {
            name,
            endpoint,
            shared,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Open the endpoint, blocking until it is connected.
    pub fn open(&self) -> Result<(), HarnessError> {
        self.endpoint.open()?;
        Ok(())
    }

    pub fn set_chunk_size(&self, chunk_size: usize) {
        self.shared.lock().chunk_size = chunk_size.max(1);
    }

    pub fn chunk_size(&self) -> usize {
        self.shared.lock().chunk_size
    }

    /// While set, inbound data is consumed without being looked at.
    pub fn set_ignore_input(&self, ignore: bool) {
        self.shared.lock().ignore_input = ignore;
    }

    pub fn ignore_input(&self) -> bool {
        self.shared.lock().ignore_input
    }

    /// Arm a comparison against `expected`; reading starts right away when
    /// `start_reading` is set.
    ///
    /// An empty buffer completes immediately: the waiter is woken and reads
    /// stay as they are.
    pub fn set_compare(
        &self,
        expected: impl Into<Vec<u8>>,
        start_reading: bool,
    ) -> Result<(), HarnessError> {
        let expected = expected.into();
        if expected.is_empty() {
            self.shared.lock().to_compare = None;
            self.shared.waiter.wake();
            return Ok(());
        }
        self.shared.lock().to_compare = Some(PendingCompare {
            expected,
            matched: 0,
        });
        if start_reading {
            self.endpoint.set_read_enabled(true)?;
        }
        Ok(())
    }

    /// Arm an outbound transfer of `data`; writing starts right away when
    /// `start_writing` is set. An empty buffer completes immediately.
    pub fn set_write_data(
        &self,
        data: impl Into<Vec<u8>>,
        start_writing: bool,
    ) -> Result<(), HarnessError> {
        let data = data.into();
        if data.is_empty() {
            self.shared.lock().to_write = None;
            self.shared.waiter.wake();
            return Ok(());
        }
        self.shared.lock().to_write = Some(PendingWrite { data, offset: 0 });
        if start_writing {
            self.endpoint.set_write_enabled(true)?;
        }
        Ok(())
    }

    /// Re-enable (or stop) read callbacks without touching comparison state.
    pub fn set_read_enabled(&self, enabled: bool) -> Result<(), HarnessError> {
        self.endpoint.set_read_enabled(enabled)?;
        Ok(())
    }

    /// `true` while a comparison or a transfer is still outstanding.
    pub fn is_armed(&self) -> bool {
        let state = self.shared.lock();
        state.to_compare.is_some() || state.to_write.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Request a close; completion wakes the waiter.
    pub fn close(&self) -> Result<(), HarnessError> {
        self.endpoint.close()?;
        Ok(())
    }

    /// Block until the next completion, then report any fault raised by the
    /// callbacks in the meantime.
    pub fn wait(&self) -> Result<(), HarnessError> {
        self.shared.waiter.wait();
        self.take_fault()
    }

    /// Like [`wait`](Self::wait) but bounded. A timeout leaves armed state as it is.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<WaitOutcome, HarnessError> {
        let outcome = self.shared.waiter.wait_timeout(timeout);
        self.take_fault()?;
        Ok(outcome)
    }

    fn take_fault(&self) -> Result<(), HarnessError> {
        match self.shared.lock().fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// The endpoint's view of a handler: shares state, not the endpoint itself.
struct HandlerEvents {
    name: String,
    shared: Arc<Shared>,
}

impl HandlerEvents {
    fn fault(&self, state: &mut HandlerState, io: &mut dyn IoControl, fault: HarnessError) {
        tracing::debug!(endpoint = %self.name, error = %fault, "handler fault");
        state.to_compare = None;
        state.fault = Some(fault);
        io.set_read_enabled(false);
        self.shared.waiter.wake();
    }
}

impl EndpointEvents for HandlerEvents {
    fn read(
        &mut self,
        io: &mut dyn IoControl,
        err: Option<EndpointError>,
        buf: &[u8],
        _flags: ReadFlags,
    ) -> usize {
        let mut state = self.shared.lock();
        if let Some(compare) = &state.to_compare {
            tracing::debug!(
                endpoint = %self.name,
                received = buf.len(),
                matched = compare.matched,
                expected = compare.expected.len(),
                "read callback",
            );
        }
        tracing::trace!(endpoint = %self.name, data = %Printable(buf), "got data");

        if state.ignore_input {
            return buf.len();
        }
        if state.to_compare.is_none() {
            tracing::debug!(endpoint = %self.name, "got data, but nothing to compare");
            io.set_read_enabled(false);
            return buf.len();
        }
        if let Some(source) = err {
            let fault = HarnessError::Read {
                name: self.name.clone(),
                source,
            };
            self.fault(&mut state, io, fault);
            return 0;
        }

        let Some(compare) = state.to_compare.as_mut() else {
            return buf.len();
        };
        let remaining = compare.expected.len() - compare.matched;
        let count = buf.len().min(remaining);
        let mut mismatch = None;
        for &actual in &buf[..count] {
            let expected = compare.expected[compare.matched];
            if actual != expected {
                mismatch = Some((compare.matched, expected, actual));
                break;
            }
            compare.matched += 1;
        }
        let done = compare.matched >= compare.expected.len();

        if let Some((offset, expected, actual)) = mismatch {
            let fault = HarnessError::Compare {
                name: self.name.clone(),
                offset,
                expected,
                actual,
            };
            self.fault(&mut state, io, fault);
            return 0;
        }
        if done {
            state.to_compare = None;
            io.set_read_enabled(false);
            self.shared.waiter.wake();
        }
        count
    }

    fn write_ready(&mut self, io: &mut dyn IoControl) {
        let mut state = self.shared.lock();
        let chunk_size = state.chunk_size;
        let Some(pending) = state.to_write.as_mut() else {
            tracing::debug!(endpoint = %self.name, "got write, but no data");
            io.set_write_enabled(false);
            return;
        };

        let end = pending.data.len().min(pending.offset + chunk_size);
        let count = io.write(&pending.data[pending.offset..end]);
        tracing::debug!(endpoint = %self.name, wrote = count, offset = pending.offset, "write callback");

        if pending.offset + count >= pending.data.len() {
            io.set_write_enabled(false);
            state.to_write = None;
            self.shared.waiter.wake();
        } else {
            pending.offset += count;
        }
    }

    fn urgent(&mut self, io: &mut dyn IoControl) {
        tracing::info!(endpoint = %self.name, remote = ?io.remote_id(), "urgent data");
    }

    fn close_done(&mut self, _name: &str) {
        tracing::debug!(endpoint = %self.name, "closed");
        self.shared.lock().closed = true;
        self.shared.waiter.wake();
    }
}

//! Two-endpoint transfer helpers built on [`StreamHandler`] and [`Daemon`].

use std::time::Duration;

use sertest_io::{EndpointError, IoContext};

use crate::daemon::{Daemon, DaemonOptions};
use crate::defaults::{CLOSE_TIMEOUT, DAEMON_HANDLER_NAME};
use crate::error::HarnessError;
use crate::handler::StreamHandler;

/// Create a handler for `spec` and open it.
pub fn open_handler(
    ctx: &IoContext,
    spec: &str,
    bufsize: usize,
) -> Result<StreamHandler, HarnessError> {
    let handler = StreamHandler::new(ctx, spec, bufsize, None)?;
    handler.open()?;
    Ok(handler)
}

/// Send `data` from `from` and check that `to` receives exactly it.
pub fn check_transfer(
    from: &StreamHandler,
    to: &StreamHandler,
    data: &[u8],
    timeout: Duration,
) -> Result<(), HarnessError> {
    tracing::debug!(from = from.name(), to = to.name(), bytes = data.len(), "transfer");
    to.set_compare(data, true)?;
    from.set_write_data(data, true)?;
    wait_stage(from, timeout, "check_transfer", "write completion")?;
    wait_stage(to, timeout, "check_transfer", "read completion")?;
    Ok(())
}

/// Send `data` both ways at once; each side must receive exactly it.
///
/// `timeout` applies to each of the four waits on its own.
pub fn check_transfer_simul(
    a: &StreamHandler,
    b: &StreamHandler,
    data: &[u8],
    timeout: Duration,
) -> Result<(), HarnessError> {
    tracing::debug!(a = a.name(), b = b.name(), bytes = data.len(), "simultaneous transfer");
    a.set_compare(data, true)?;
    b.set_compare(data, true)?;
    a.set_write_data(data, true)?;
    b.set_write_data(data, true)?;

    // Each handler is woken once by its write and once by its compare.
    for (handler, stage) in [
        (a, "first completion"),
        (b, "first completion"),
        (a, "second completion"),
        (b, "second completion"),
    ] {
        wait_stage(handler, timeout, "check_transfer_simul", stage)?;
    }
    Ok(())
}

/// Close `handler` and wait for the close to complete.
pub fn close_handler(handler: &StreamHandler, timeout: Duration) -> Result<(), HarnessError> {
    handler.close()?;
    while !handler.is_closed() {
        wait_stage(handler, timeout, "close", "close")?;
    }
    Ok(())
}

fn wait_stage(
    handler: &StreamHandler,
    timeout: Duration,
    op: &'static str,
    stage: &'static str,
) -> Result<(), HarnessError> {
    if handler.wait_timeout(timeout)?.timed_out() {
        return Err(HarnessError::Timeout {
            op,
            name: handler.name().to_string(),
            stage,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DaemonSession
// ---------------------------------------------------------------------------

/// A daemon plus the two endpoints a transfer test talks through.
#[derive(Debug)]
pub struct DaemonSession {
    daemon: Daemon,
    io1: StreamHandler,
    io1_owned: bool,
    io2: StreamHandler,
}

impl DaemonSession {
    /// Start the daemon, then open `io1` and `io2`.
    ///
    /// With `io1 = None` the daemon's own stdio is used as the first endpoint.
    /// Any failure closes what was opened and terminates the daemon.
    pub fn start(
        ctx: &IoContext,
        options: DaemonOptions,
        config: &str,
        io1: Option<&str>,
        io2: &str,
    ) -> Result<Self, HarnessError> {
        let bufsize = options.bufsize;
        let daemon = Daemon::start_with(ctx, config, options)?;

        let (io1, io1_owned) = match io1 {
            Some(spec) => (open_handler(ctx, spec, bufsize)?, true),
            None => {
                let stdio = daemon.stdio().ok_or_else(|| EndpointError::NotOpen {
                    name: DAEMON_HANDLER_NAME.to_string(),
                })?;
                stdio.set_ignore_input(false);
                (stdio.clone(), false)
            }
        };

        let io2 = match open_handler(ctx, io2, bufsize) {
            Ok(io2) => io2,
            Err(err) => {
                if io1_owned {
                    if let Err(close_err) = close_handler(&io1, CLOSE_TIMEOUT) {
                        tracing::debug!(error = %close_err, "closing io1 after failed setup");
                    }
                }
                return Err(err);
            }
        };

        Ok(Self {
            daemon,
            io1,
            io1_owned,
            io2,
        })
    }

    pub fn io1(&self) -> &StreamHandler {
        &self.io1
    }

    pub fn io2(&self) -> &StreamHandler {
        &self.io2
    }

    pub fn daemon(&self) -> &Daemon {
        &self.daemon
    }

    pub fn daemon_mut(&mut self) -> &mut Daemon {
        &mut self.daemon
    }

    /// Close both endpoints and terminate the daemon.
    ///
    /// Every step runs; the first error is returned.
    pub fn finish(mut self) -> Result<(), HarnessError> {
        let mut first_err = None;
        if self.io1_owned {
            keep_first(&mut first_err, close_handler(&self.io1, CLOSE_TIMEOUT));
        } else {
            self.io1.set_ignore_input(true);
        }
        keep_first(&mut first_err, close_handler(&self.io2, CLOSE_TIMEOUT));
        keep_first(&mut first_err, self.daemon.terminate());
        first_err.map_or(Ok(()), Err)
    }
}

fn keep_first(slot: &mut Option<HarnessError>, result: Result<(), HarnessError>) {
    if let Err(err) = result {
        tracing::debug!(error = %err, "session teardown");
        slot.get_or_insert(err);
    }
}

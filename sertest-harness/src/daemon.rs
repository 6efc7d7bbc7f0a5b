//! Daemon lifecycle: config staging, readiness handshake, escalating shutdown.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sertest_io::spec::quote_word;
use sertest_io::{ChildProcess, EndpointError, IoContext, Signal};
use tempfile::NamedTempFile;

use crate::defaults::{
    DAEMON_CONFIG_FLAG, DAEMON_EXEC_ENV, DAEMON_FLAGS, DAEMON_HANDLER_NAME, DEFAULT_BUFSIZE,
    DEFAULT_DAEMON_EXEC, READY_LINE, READY_TIMEOUT, TERMINATE_KILL_ROUNDS,
    TERMINATE_ROUNDS, TERMINATE_ROUND_TIMEOUT,
};
use crate::error::{io_err, HarnessError};
use crate::handler::StreamHandler;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Signal escalation used by [`Daemon::terminate`].
///
/// Rounds are numbered from 1. The first `kill_rounds` send `SIGKILL`, the rest
/// `SIGTERM`; each round waits up to `round_timeout` for the exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationSchedule {
    pub rounds: u32,
    pub kill_rounds: u32,
    pub round_timeout: Duration,
}

impl TerminationSchedule {
    pub fn signal_for_round(&self, round: u32) -> Signal {
        if round <= self.kill_rounds {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        }
    }
}

impl Default for TerminationSchedule {
    fn default() -> Self {
        Self {
            rounds: TERMINATE_ROUNDS,
            kill_rounds: TERMINATE_KILL_ROUNDS,
            round_timeout: TERMINATE_ROUND_TIMEOUT,
        }
    }
}

/// How to launch the daemon.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub executable: PathBuf,
    /// Appended verbatim after the fixed flags.
    pub extra_args: String,
    pub ready_timeout: Duration,
    pub bufsize: usize,
    pub schedule: TerminationSchedule,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_DAEMON_EXEC),
            extra_args: String::new(),
            ready_timeout: READY_TIMEOUT,
            bufsize: DEFAULT_BUFSIZE,
            schedule: TerminationSchedule::default(),
        }
    }
}

impl DaemonOptions {
    /// Defaults, with the executable taken from `SER2NET_EXEC` when set.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(exec) = std::env::var_os(DAEMON_EXEC_ENV).filter(|v| !v.is_empty()) {
            options.executable = PathBuf::from(exec);
        }
        options
    }

    pub fn executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn extra_args(mut self, extra_args: impl Into<String>) -> Self {
        self.extra_args = extra_args.into();
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn bufsize(mut self, bufsize: usize) -> Self {
        self.bufsize = bufsize;
        self
    }

    pub fn schedule(mut self, schedule: TerminationSchedule) -> Self {
        self.schedule = schedule;
        self
    }
}

/// `stdio,<exe> -r -d -c <config> <extra>`
pub(crate) fn daemon_command(options: &DaemonOptions, config_path: &Path) -> String {
    let mut words = vec![quote_word(&options.executable.to_string_lossy())];
    words.extend(DAEMON_FLAGS.iter().map(|flag| flag.to_string()));
    words.push(DAEMON_CONFIG_FLAG.to_string());
    words.push(quote_word(&config_path.to_string_lossy()));
    let extra = options.extra_args.trim();
    if !extra.is_empty() {
        words.push(extra.to_string());
    }
    format!("stdio,{}", words.join(" "))
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// A running daemon subprocess and the handler on its stdio.
///
/// Dropping a daemon that has not been terminated terminates it.
#[derive(Debug)]
pub struct Daemon {
    config_file: NamedTempFile,
    handler: Option<StreamHandler>,
    process: ChildProcess,
    schedule: TerminationSchedule,
}

impl Daemon {
    /// Start the daemon with options from the environment.
    pub fn start(ctx: &IoContext, config: &str) -> Result<Self, HarnessError> {
        Self::start_with(ctx, config, DaemonOptions::from_env())
    }

    /// Stage `config`, spawn the daemon and wait for its readiness line.
    pub fn start_with(
        ctx: &IoContext,
        config: &str,
        options: DaemonOptions,
    ) -> Result<Self, HarnessError> {
        let config_file = stage_config(config)?;
        let command = daemon_command(&options, config_file.path());
        tracing::info!(command = %command, "starting daemon");

        let handler = StreamHandler::new(ctx, &command, options.bufsize, Some(DAEMON_HANDLER_NAME))?;
        handler.open()?;
        let process = handler
            .endpoint()
            .child()
            .cloned()
            .ok_or_else(|| EndpointError::NotOpen {
                name: DAEMON_HANDLER_NAME.to_string(),
            })?;

        let daemon = Daemon {
            config_file,
            handler: Some(handler.clone()),
            process,
            schedule: options.schedule,
        };

        // From here on, dropping `daemon` on any error path tears the child down.
        handler.set_compare(READY_LINE, true)?;
        let outcome = handler.wait_timeout(options.ready_timeout)?;
        if outcome.timed_out() {
            tracing::warn!(pid = daemon.pid(), "daemon never reported ready");
            let mut daemon = daemon;
            if let Err(err) = daemon.terminate() {
                tracing::error!(error = %err, "cleanup after failed startup");
            }
            return Err(HarnessError::SetupTimeout {
                timeout: options.ready_timeout,
            });
        }

        // Keep draining daemon chatter so it never blocks on a full pipe.
        handler.set_ignore_input(true);
        handler.set_read_enabled(true)?;
        tracing::info!(pid = daemon.pid(), "daemon ready");
        Ok(daemon)
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub fn config_path(&self) -> &Path {
        self.config_file.path()
    }

    /// Handler on the daemon's stdio, until the daemon is terminated.
    pub fn stdio(&self) -> Option<&StreamHandler> {
        self.handler.as_ref()
    }

    pub fn process(&self) -> &ChildProcess {
        &self.process
    }

    pub fn is_running(&self) -> bool {
        self.handler.is_some() && matches!(self.process.try_wait(), Ok(None))
    }

    /// Deliver `sig` to the daemon. Refused once the daemon has been reaped.
    pub fn signal(&self, sig: Signal) -> Result<(), HarnessError> {
        self.process.signal(sig)?;
        Ok(())
    }

    /// Close the daemon's stdio and signal it until it exits.
    ///
    /// A second call after success does nothing.
    pub fn terminate(&mut self) -> Result<(), HarnessError> {
        let Some(handler) = self.handler.as_ref() else {
            return Ok(());
        };
        let pid = self.pid();
        if let Err(err) = handler.close() {
            tracing::debug!(pid, error = %err, "daemon stdio already closed");
        }

        for round in 1..=self.schedule.rounds {
            if self.process.try_wait()?.is_some() {
                break;
            }
            let sig = self.schedule.signal_for_round(round);
            tracing::debug!(pid, round, signal = %sig, "terminating daemon");
            match self.process.signal(sig) {
                Ok(()) | Err(EndpointError::ProcessExited { .. }) => {}
                Err(err) => return Err(err.into()),
            }
            if self.process.wait_timeout(self.schedule.round_timeout)?.is_some() {
                break;
            }
        }

        match self.process.exit_status() {
            Some(status) => {
                tracing::info!(pid, status = %status, "daemon terminated");
                self.handler = None;
                Ok(())
            }
            None => Err(HarnessError::NotTerminated {
                pid,
                rounds: self.schedule.rounds,
            }),
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if self.handler.is_none() {
            return;
        }
        if let Err(err) = self.terminate() {
            tracing::error!(pid = self.pid(), error = %err, "failed to terminate daemon on drop");
        }
    }
}

fn stage_config(config: &str) -> Result<NamedTempFile, HarnessError> {
    let mut file = tempfile::Builder::new()
        .prefix("ser2net-config-")
        .suffix(".yaml")
        .tempfile()
        .map_err(|e| io_err(std::env::temp_dir(), e))?;
    let path = file.path().to_path_buf();
    file.write_all(config.as_bytes())
        .map_err(|e| io_err(&path, e))?;
    file.as_file().sync_all().map_err(|e| io_err(&path, e))?;
    tracing::debug!(path = %path.display(), bytes = config.len(), "staged daemon config");
    Ok(file)
}

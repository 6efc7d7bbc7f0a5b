use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use sertest_io::EndpointError;

/// Error surface for stream handlers, the daemon lifecycle and transfer helpers.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Received data differed from what the handler was told to expect.
    #[error("{name}: compare failure on byte {offset}, expected {expected:#04x}, got {actual:#04x}")]
    Compare {
        name: String,
        offset: usize,
        expected: u8,
        actual: u8,
    },

    /// The endpoint reported an error while a comparison was armed.
    #[error("{name}: read: {source}")]
    Read {
        name: String,
        #[source]
        source: EndpointError,
    },

    #[error("timeout waiting for daemon to start ({} ms)", timeout.as_millis())]
    SetupTimeout { timeout: Duration },

    /// A bounded wait in one of the transfer helpers ran out.
    #[error("{op}: {name}: timed out waiting for {stage}")]
    Timeout {
        op: &'static str,
        name: String,
        stage: &'static str,
    },

    #[error("daemon (pid {pid}) did not terminate after {rounds} signal rounds")]
    NotTerminated { pid: u32, rounds: u32 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HarnessError {
    HarnessError::Io {
        path: path.into(),
        source,
    }
}

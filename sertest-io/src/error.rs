//! Error types for sertest-io.

use thiserror::Error;

/// All errors that can arise from endpoint and child-process operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Underlying I/O failure, annotated with what was being touched.
    #[error("I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The connection string could not be parsed.
    #[error("invalid connection string '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// The subprocess behind a `stdio` endpoint could not be started.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name}: endpoint already opened")]
    AlreadyOpen { name: String },

    #[error("{name}: endpoint is not open")]
    NotOpen { name: String },

    #[error("{name}: endpoint is closed")]
    Closed { name: String },

    /// The remote side closed the stream.
    #[error("remote end closed the connection")]
    RemoteClosed,

    /// The child has already been reaped; its pid may belong to someone else now.
    #[error("process {pid} has already exited")]
    ProcessExited { pid: u32 },

    #[error("failed to send {signal} to process {pid}: {source}")]
    Signal {
        pid: u32,
        signal: nix::sys::signal::Signal,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

pub(crate) fn io_err(target: impl Into<String>, source: std::io::Error) -> EndpointError {
    EndpointError::Io {
        target: target.into(),
        source,
    }
}

pub(crate) fn invalid_spec(spec: &str, reason: impl Into<String>) -> EndpointError {
    EndpointError::InvalidSpec {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

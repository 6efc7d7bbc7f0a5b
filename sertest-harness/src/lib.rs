//! Test harness for a ser2net-style daemon: stream compare/transfer handlers,
//! daemon lifecycle, and two-endpoint transfer helpers.

pub mod daemon;
pub mod defaults;
mod error;
pub mod handler;
mod trace;
pub mod xfer;

pub use daemon::{Daemon, DaemonOptions, TerminationSchedule};
pub use error::HarnessError;
pub use handler::StreamHandler;
pub use trace::{init_tracing, Printable};
pub use xfer::{check_transfer, check_transfer_simul, close_handler, open_handler, DaemonSession};

pub use sertest_io::{IoContext, Signal, WaitOutcome};

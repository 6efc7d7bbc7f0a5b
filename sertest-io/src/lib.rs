//! sertest-io: callback-driven byte-stream endpoints on a tokio runtime.
//!
//! Public API surface:
//! - [`IoContext`]: owns the runtime every endpoint runs on
//! - [`Endpoint`] / [`EndpointEvents`] / [`IoControl`]: the endpoint and its callbacks
//! - [`IoSpec`]: `tcp,…` / `unix,…` / `stdio,…` connection strings
//! - [`Waiter`]: counting completion signal for blocking callers
//! - [`ChildProcess`]: subprocess behind a `stdio` endpoint

pub mod context;
mod driver;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod process;
pub mod spec;
pub mod waiter;

pub use context::IoContext;
pub use endpoint::{Endpoint, DEFAULT_BUFSIZE, DEFAULT_WRITE_CAPACITY};
pub use error::EndpointError;
pub use events::{EndpointEvents, IoControl, ReadFlags};
pub use process::ChildProcess;
pub use spec::IoSpec;
pub use waiter::{WaitOutcome, Waiter};

pub use nix::sys::signal::Signal;

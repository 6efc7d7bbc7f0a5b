use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::EndpointError;

/// Owner of the event source that drives every endpoint.
///
/// Clones share one multi-threaded tokio runtime. The runtime shuts down when
/// the last clone is dropped, so drop it from ordinary (non-runtime) threads.
#[derive(Clone)]
pub struct IoContext {
    runtime: Arc<Runtime>,
}

impl IoContext {
    pub fn new() -> Result<Self, EndpointError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("sertest-io")
            .build()
            .map_err(EndpointError::Runtime)?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Run `future` to completion on the calling thread.
    ///
    /// Panics when called from inside one of the runtime's own tasks.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }
}

impl std::fmt::Debug for IoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoContext").finish_non_exhaustive()
    }
}

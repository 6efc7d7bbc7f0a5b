use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::net::{TcpStream, UnixStream};
use tokio::process::Command as ProcessCommand;
use tokio::sync::mpsc;

use crate::context::IoContext;
use crate::driver::{BoxedReader, BoxedWriter, Command, Driver};
use crate::error::{io_err, EndpointError};
use crate::events::EndpointEvents;
use crate::process::ChildProcess;
use crate::spec::IoSpec;

/// Default per-read buffer size.
pub const DEFAULT_BUFSIZE: usize = 1024;

/// Bytes `IoControl::write` will queue before it starts refusing more.
pub const DEFAULT_WRITE_CAPACITY: usize = 64 * 1024;

/// Handle to one side of an asynchronous byte stream.
///
/// Clones refer to the same endpoint. All callbacks go to the
/// [`EndpointEvents`] given at construction, from the endpoint's driver task.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    spec: IoSpec,
    bufsize: usize,
    ctx: IoContext,
    commands: mpsc::UnboundedSender<Command>,
    unopened: Mutex<Option<Unopened>>,
    child: OnceLock<ChildProcess>,
}

struct Unopened {
    commands: mpsc::UnboundedReceiver<Command>,
    events: Box<dyn EndpointEvents>,
}

impl Endpoint {
    /// Create an endpoint for `spec` without connecting it.
    ///
    /// The endpoint's name is the connection string as given.
    pub fn new(
        ctx: &IoContext,
        spec: &str,
        bufsize: usize,
        events: Box<dyn EndpointEvents>,
    ) -> Result<Self, EndpointError> {
        let parsed: IoSpec = spec.parse()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            inner: Arc::new(Inner {
                name: spec.to_string(),
                spec: parsed,
                bufsize,
                ctx: ctx.clone(),
                commands: tx,
                unopened: Mutex::new(Some(Unopened {
                    commands: rx,
                    events,
                })),
                child: OnceLock::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn spec(&self) -> &IoSpec {
        &self.inner.spec
    }

    pub fn context(&self) -> &IoContext {
        &self.inner.ctx
    }

    /// Connect (or spawn) and start delivering callbacks. Blocks until the
    /// transport is established.
    pub fn open(&self) -> Result<(), EndpointError> {
        let Some(unopened) = lock(&self.inner.unopened).take() else {
            return Err(EndpointError::AlreadyOpen {
                name: self.inner.name.clone(),
            });
        };

        let ctx = &self.inner.ctx;
        let (reader, writer, child) = ctx.block_on(connect(&self.inner.spec))?;

        let remote_id = match child {
            Some((pid, child)) => {
                let _ = self
                    .inner
                    .child
                    .set(ChildProcess::new(ctx.clone(), pid, child));
                Some(pid)
            }
            None => None,
        };

        tracing::debug!(endpoint = %self.inner.name, remote_id = ?remote_id, "opened");
        let driver = Driver::new(
            self.inner.name.clone(),
            remote_id,
            reader,
            writer,
            unopened.commands,
            unopened.events,
            self.inner.bufsize,
            DEFAULT_WRITE_CAPACITY,
        );
        ctx.spawn(driver.run());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner.unopened).is_none() && !self.inner.commands.is_closed()
    }

    /// Request an asynchronous close; `close_done` fires when it completes.
    pub fn close(&self) -> Result<(), EndpointError> {
        if lock(&self.inner.unopened).is_some() {
            return Err(EndpointError::NotOpen {
                name: self.inner.name.clone(),
            });
        }
        self.send(Command::Close)
    }

    pub fn set_read_enabled(&self, enabled: bool) -> Result<(), EndpointError> {
        self.send(Command::ReadEnable(enabled))
    }

    pub fn set_write_enabled(&self, enabled: bool) -> Result<(), EndpointError> {
        self.send(Command::WriteEnable(enabled))
    }

    /// Process id of the subprocess behind a `stdio` endpoint.
    pub fn remote_id(&self) -> Option<u32> {
        self.inner.child.get().map(ChildProcess::pid)
    }

    pub fn child(&self) -> Option<&ChildProcess> {
        self.inner.child.get()
    }

    fn send(&self, command: Command) -> Result<(), EndpointError> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| EndpointError::Closed {
                name: self.inner.name.clone(),
            })
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.inner.name)
            .field("remote_id", &self.remote_id())
            .finish()
    }
}

type Connected = (BoxedReader, BoxedWriter, Option<(u32, tokio::process::Child)>);

async fn connect(spec: &IoSpec) -> Result<Connected, EndpointError> {
    match spec {
        IoSpec::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|e| io_err(spec.to_string(), e))?;
            stream
                .set_nodelay(true)
                .map_err(|e| io_err(spec.to_string(), e))?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer), None))
        }
        IoSpec::Unix { path } => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| io_err(spec.to_string(), e))?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer), None))
        }
        IoSpec::Stdio { program, args } => {
            let mut child = ProcessCommand::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|source| EndpointError::Spawn {
                    command: spec.to_string(),
                    source,
                })?;
            let pid = child.id().ok_or_else(|| {
                io_err(
                    spec.to_string(),
                    std::io::Error::other("child exited before its pid was read"),
                )
            })?;
            let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
                return Err(io_err(
                    spec.to_string(),
                    std::io::Error::other("child stdio pipes missing"),
                ));
            };
            Ok((Box::new(stdout), Box::new(stdin), Some((pid, child))))
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

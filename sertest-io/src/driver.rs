//! Per-endpoint task that turns socket readiness into callbacks.

use std::future::pending;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{io_err, EndpointError};
use crate::events::{EndpointEvents, IoControl, ReadFlags};

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug)]
pub(crate) enum Command {
    ReadEnable(bool),
    WriteEnable(bool),
    Close,
}

/// Driver-side state handed to callbacks as `&mut dyn IoControl`.
struct Control {
    name: String,
    remote_id: Option<u32>,
    read_enabled: bool,
    write_enabled: bool,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    write_capacity: usize,
    eof: bool,
    broken: bool,
    pending_error: Option<EndpointError>,
}

impl Control {
    fn has_room(&self) -> bool {
        !self.broken && self.outbound.len() < self.write_capacity
    }
}

impl IoControl for Control {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if self.broken {
            return 0;
        }
        let room = self.write_capacity.saturating_sub(self.outbound.len());
        let accepted = buf.len().min(room);
        self.outbound.extend_from_slice(&buf[..accepted]);
        accepted
    }

    fn set_read_enabled(&mut self, enabled: bool) {
        self.read_enabled = enabled;
    }

    fn set_write_enabled(&mut self, enabled: bool) {
        self.write_enabled = enabled;
    }

    fn remote_id(&self) -> Option<u32> {
        self.remote_id
    }
}

pub(crate) struct Driver {
    reader: BoxedReader,
    writer: Option<BoxedWriter>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: Box<dyn EndpointEvents>,
    control: Control,
    chunk: Vec<u8>,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        remote_id: Option<u32>,
        reader: BoxedReader,
        writer: BoxedWriter,
        commands: mpsc::UnboundedReceiver<Command>,
        events: Box<dyn EndpointEvents>,
        bufsize: usize,
        write_capacity: usize,
    ) -> Self {
        Self {
            reader,
            writer: Some(writer),
            commands,
            events,
            control: Control {
                name,
                remote_id,
                read_enabled: false,
                write_enabled: false,
                inbound: Vec::new(),
                outbound: Vec::new(),
                write_capacity: write_capacity.max(1),
                eof: false,
                broken: false,
                pending_error: None,
            },
            chunk: vec![0u8; bufsize.max(1)],
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            if self.control.read_enabled && self.deliver_inbound() {
                continue;
            }
            if self.control.write_enabled && self.control.has_room() {
                self.events.write_ready(&mut self.control);
            }

            let can_read =
                self.control.read_enabled && self.control.inbound.is_empty() && !self.control.eof;
            let can_flush = !self.control.outbound.is_empty() && self.writer.is_some();
            let wants_write = self.control.write_enabled && self.control.has_room();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::ReadEnable(on)) => self.control.read_enabled = on,
                    Some(Command::WriteEnable(on)) => self.control.write_enabled = on,
                    Some(Command::Close) | None => {
                        self.shutdown().await;
                        return;
                    }
                },
                result = self.reader.read(&mut self.chunk), if can_read => match result {
                    Ok(0) => {
                        tracing::debug!(endpoint = %self.control.name, "end of stream");
                        self.control.eof = true;
                        self.control.pending_error = Some(EndpointError::RemoteClosed);
                    }
                    Ok(n) => self.control.inbound.extend_from_slice(&self.chunk[..n]),
                    Err(err) => {
                        tracing::debug!(endpoint = %self.control.name, error = %err, "read failed");
                        self.control.eof = true;
                        self.control.pending_error = Some(io_err(self.control.name.clone(), err));
                    }
                },
                result = write_some(&mut self.writer, &self.control.outbound), if can_flush => match result {
                    Ok(n) => {
                        self.control.outbound.drain(..n);
                    }
                    Err(err) => {
                        tracing::debug!(endpoint = %self.control.name, error = %err, "write failed");
                        self.writer = None;
                        self.control.broken = true;
                        self.control.outbound.clear();
                        if self.control.pending_error.is_none() {
                            self.control.pending_error = Some(io_err(self.control.name.clone(), err));
                        }
                    }
                },
                _ = tokio::task::yield_now(), if wants_write => {}
            }
        }
    }

    /// Offer pending bytes (then any pending error) to the read callback.
    /// Returns `true` when the callback made progress.
    fn deliver_inbound(&mut self) -> bool {
        if !self.control.inbound.is_empty() {
            let mut data = std::mem::take(&mut self.control.inbound);
            let consumed = self
                .events
                .read(&mut self.control, None, &data, ReadFlags::NONE)
                .min(data.len());
            data.drain(..consumed);
            self.control.inbound = data;
            return consumed > 0;
        }
        if let Some(err) = self.control.pending_error.take() {
            self.events
                .read(&mut self.control, Some(err), &[], ReadFlags::NONE);
            return true;
        }
        false
    }

    async fn shutdown(mut self) {
        if let Some(mut writer) = self.writer.take() {
            if !self.control.outbound.is_empty() {
                if let Err(err) = writer.write_all(&self.control.outbound).await {
                    tracing::debug!(endpoint = %self.control.name, error = %err, "dropping unflushed output on close");
                }
            }
            let _ = writer.shutdown().await;
        }
        drop(self.reader);
        tracing::debug!(endpoint = %self.control.name, "closed");
        self.events.close_done(&self.control.name);
    }
}

// Cancel-safe: a single `write` either completes or leaves the buffer untouched.
// The transports used here are unbuffered, so no flush is needed between writes.
async fn write_some(writer: &mut Option<BoxedWriter>, buf: &[u8]) -> std::io::Result<usize> {
    match writer {
        Some(writer) => match writer.write(buf).await? {
            0 => Err(std::io::ErrorKind::WriteZero.into()),
            n => Ok(n),
        },
        None => pending().await,
    }
}

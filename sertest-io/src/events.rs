//! Callback surface between an endpoint driver and its user.

use crate::error::EndpointError;

/// Flags attached to a read delivery. The built-in transports only ever
/// deliver [`ReadFlags::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadFlags(u32);

impl ReadFlags {
    pub const NONE: ReadFlags = ReadFlags(0);
}

/// Endpoint operations available from inside a callback.
///
/// Changes made here take effect before the driver looks for its next event.
pub trait IoControl {
    fn name(&self) -> &str;

    /// Queue bytes for transmission; returns how many were accepted.
    fn write(&mut self, buf: &[u8]) -> usize;

    fn set_read_enabled(&mut self, enabled: bool);

    fn set_write_enabled(&mut self, enabled: bool);

    /// Process id of the peer for subprocess endpoints.
    fn remote_id(&self) -> Option<u32>;
}

/// Callbacks invoked by an endpoint driver, always from one task at a time.
pub trait EndpointEvents: Send + 'static {
    /// Bytes arrived (or `err` reports why no more will). Returns the number of
    /// bytes consumed; the rest is offered again later.
    fn read(
        &mut self,
        io: &mut dyn IoControl,
        err: Option<EndpointError>,
        buf: &[u8],
        flags: ReadFlags,
    ) -> usize;

    /// The endpoint can accept more outbound bytes.
    fn write_ready(&mut self, io: &mut dyn IoControl);

    /// Out-of-band data arrived. None of the tcp, unix or stdio transports
    /// raise this; it exists for transports with an urgent channel.
    fn urgent(&mut self, io: &mut dyn IoControl) {
        tracing::info!(endpoint = io.name(), "urgent data");
    }

    /// The endpoint finished closing. Called exactly once.
    fn close_done(&mut self, name: &str);
}

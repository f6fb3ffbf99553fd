use std::time::Duration;

use crate::error::Result;

/// A connected, reliable byte stream.
///
/// `receive` never blocks: it returns `Ok(0)` when no bytes are available yet
/// and [`TransportError::Disconnected`](crate::TransportError::Disconnected)
/// once the peer has gone away. `send` writes the whole buffer, fails, or
/// returns a short count once its send timeout has passed.
///
/// Sessions read and write from different threads, so a transport must be able
/// to hand out a second handle to the same stream via [`Transport::try_clone`].
pub trait Transport: Send + 'static {
    /// Read up to `buf.len()` bytes that are available now.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `data` to the stream, returning the number of bytes written.
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Create another handle to the same underlying stream.
    fn try_clone(&self) -> Result<Self>
    where
        Self: Sized;

    /// Bound how long `send` waits for a peer that is not reading.
    ///
    /// `None` waits indefinitely. Clones inherit the setting.
    fn set_send_timeout(&mut self, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }

    /// Close both directions of the stream.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str {
        "custom"
    }
}

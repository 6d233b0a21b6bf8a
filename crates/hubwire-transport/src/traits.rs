use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::Result;

/// A connected hub characteristic.
///
/// Implementations wrap exactly one writable, notifying characteristic.
/// Writes may be issued concurrently by callers; serialization is the
/// caller's job (see the messenger's outbound channel).
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Write bytes without requesting a link-layer confirmation.
    async fn write(&self, data: Bytes) -> Result<()>;

    /// Write bytes and wait for the peripheral to confirm the write.
    ///
    /// Some stacks disconnect spuriously on silent writes; those transports
    /// should be driven through this primitive instead of [`write`](Self::write).
    async fn write_confirmed(&self, data: Bytes) -> Result<()>;

    /// Subscribe to raw notification buffers from the characteristic.
    ///
    /// Each received value is one notification. The stream closes when the
    /// transport disconnects.
    fn notifications(&self) -> broadcast::Receiver<Bytes>;
}

//! Outbound channel: the single serialized path to the characteristic.
//!
//! Every write, from every lane, is appended to one FIFO. A write starts
//! only after all earlier writes have settled, whether they succeeded or
//! failed. Message semantics are invisible at this layer.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use hubwire_transport::{HubTransport, TransportError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::config::WriteMode;
use crate::error::{MessengerError, Result};

/// Callback fired right before the physical write of a packet begins.
pub type BeforeSend = Box<dyn FnOnce() + Send + 'static>;

struct WriteRequest {
    packet: Bytes,
    before_send: Option<BeforeSend>,
    done: oneshot::Sender<std::result::Result<(), TransportError>>,
}

/// Serializes physical writes onto one transport.
pub struct OutboundChannel {
    tx: mpsc::UnboundedSender<WriteRequest>,
    mode: WriteMode,
}

impl OutboundChannel {
    /// Start the channel's writer on the current tokio runtime.
    pub fn new(transport: Arc<dyn HubTransport>, mode: WriteMode) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(transport, mode, rx));
        Self { tx, mode }
    }

    /// Which write primitive this channel drives.
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Append a packet to the write chain.
    ///
    /// The packet's position in the chain is fixed when this method is
    /// called, not when the returned future is first polled. Dropping the
    /// future detaches the caller but does not retract the write.
    pub fn send_message(
        &self,
        packet: Bytes,
        before_send: Option<BeforeSend>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let (done, settled) = oneshot::channel();
        let queued = self
            .tx
            .send(WriteRequest {
                packet,
                before_send,
                done,
            })
            .is_ok();

        async move {
            if !queued {
                return Err(MessengerError::Disposed);
            }
            match settled.await {
                Ok(result) => result.map_err(MessengerError::from),
                Err(_) => Err(MessengerError::Disposed),
            }
        }
    }
}

impl std::fmt::Debug for OutboundChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundChannel")
            .field("mode", &self.mode)
            .finish()
    }
}

async fn run_writer(
    transport: Arc<dyn HubTransport>,
    mode: WriteMode,
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
) {
    while let Some(request) = rx.recv().await {
        if let Some(before_send) = request.before_send {
            before_send();
        }

        trace!(len = request.packet.len(), ?mode, "writing packet");
        let result = match mode {
            WriteMode::WithoutResponse => transport.write(request.packet).await,
            WriteMode::WithResponse => transport.write_confirmed(request.packet).await,
        };
        if let Err(err) = &result {
            warn!(%err, "characteristic write failed");
        }
        let _ = request.done.send(result);
    }
    debug!("outbound channel closed");
}

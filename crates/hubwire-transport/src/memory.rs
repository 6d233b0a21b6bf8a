use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::HubTransport;

const NOTIFICATION_CAPACITY: usize = 256;

/// Scripted outcome for one physical write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBehavior {
    /// Complete immediately.
    Succeed,
    /// Reject the write with the given message.
    Fail(String),
    /// Complete after the given delay.
    Delay(Duration),
    /// Never complete.
    Stall,
}

/// One observed physical write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    /// Bytes handed to the characteristic.
    pub data: Bytes,
    /// Whether the confirmed-write primitive was used.
    pub confirmed: bool,
    /// When the write started.
    pub started_at: Instant,
    /// When the write settled, if it has.
    pub finished_at: Option<Instant>,
}

/// In-memory hub characteristic.
///
/// Records every write, lets callers script per-write outcomes, and injects
/// notifications as if the hub had sent them. Writes are observable as a
/// broadcast so a simulated hub can answer them.
pub struct MemoryTransport {
    notifications: Mutex<Option<broadcast::Sender<Bytes>>>,
    written: broadcast::Sender<Bytes>,
    behaviors: Mutex<VecDeque<WriteBehavior>>,
    records: Mutex<Vec<WriteRecord>>,
}

impl MemoryTransport {
    /// Create a connected transport where every write succeeds.
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (written, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            notifications: Mutex::new(Some(notifications)),
            written,
            behaviors: Mutex::new(VecDeque::new()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcome of the next unscripted write.
    pub fn push_behavior(&self, behavior: WriteBehavior) {
        self.behaviors.lock().push_back(behavior);
    }

    /// Deliver a notification to every subscriber.
    ///
    /// Returns `false` once the transport is disconnected.
    pub fn notify(&self, data: impl Into<Bytes>) -> bool {
        let data = data.into();
        match self.notifications.lock().as_ref() {
            Some(tx) => {
                trace!(len = data.len(), "injecting notification");
                let _ = tx.send(data);
                true
            }
            None => false,
        }
    }

    /// Subscribe to bytes as they reach the characteristic.
    pub fn subscribe_writes(&self) -> broadcast::Receiver<Bytes> {
        self.written.subscribe()
    }

    /// Snapshot of every write so far, in start order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.records.lock().clone()
    }

    /// Number of writes started so far.
    pub fn write_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Drop the link: close notification streams and fail later writes.
    pub fn disconnect(&self) {
        if self.notifications.lock().take().is_some() {
            debug!("memory transport disconnected");
        }
    }

    /// Whether [`disconnect`](Self::disconnect) has been called.
    pub fn is_connected(&self) -> bool {
        self.notifications.lock().is_some()
    }

    async fn perform(&self, data: Bytes, confirmed: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let behavior = self
            .behaviors
            .lock()
            .pop_front()
            .unwrap_or(WriteBehavior::Succeed);

        let index = {
            let mut records = self.records.lock();
            records.push(WriteRecord {
                data: data.clone(),
                confirmed,
                started_at: Instant::now(),
                finished_at: None,
            });
            records.len() - 1
        };
        trace!(index, len = data.len(), confirmed, ?behavior, "write started");
        let _ = self.written.send(data);

        let outcome = match behavior {
            WriteBehavior::Succeed => Ok(()),
            WriteBehavior::Fail(reason) => Err(TransportError::Write(reason)),
            WriteBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            WriteBehavior::Stall => std::future::pending().await,
        };

        if let Some(record) = self.records.lock().get_mut(index) {
            record.finished_at = Some(Instant::now());
        }
        outcome
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HubTransport for MemoryTransport {
    async fn write(&self, data: Bytes) -> Result<()> {
        self.perform(data, false).await
    }

    async fn write_confirmed(&self, data: Bytes) -> Result<()> {
        self.perform(data, true).await
    }

    fn notifications(&self) -> broadcast::Receiver<Bytes> {
        match self.notifications.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("connected", &self.is_connected())
            .field("writes", &self.write_count())
            .finish()
    }
}

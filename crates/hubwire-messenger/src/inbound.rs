use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use hubwire_frame::{dissect, InboundMessage, MessageParser};
use hubwire_transport::HubTransport;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

type ReplyFilter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Dissects inbound notifications and hands out typed reply channels.
#[derive(Clone)]
pub struct ReplyDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    messages: broadcast::Sender<InboundMessage>,
    disconnect: CancellationToken,
    capacity: usize,
    channels: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ReplyDispatcher {
    /// Start dissecting a raw notification stream.
    ///
    /// When the source closes the disconnect token is cancelled, ending
    /// every reply stream handed out by this dispatcher.
    pub fn new(
        notifications: broadcast::Receiver<Bytes>,
        disconnect: CancellationToken,
        capacity: usize,
    ) -> Self {
        let (messages, _) = broadcast::channel(capacity.max(1));
        tokio::spawn(run_dissector(
            notifications,
            messages.clone(),
            disconnect.clone(),
        ));
        Self {
            inner: Arc::new(DispatcherInner {
                messages,
                disconnect,
                capacity: capacity.max(1),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to a transport's notifications and start dissecting them.
    pub fn for_transport(
        transport: &dyn HubTransport,
        disconnect: CancellationToken,
        capacity: usize,
    ) -> Self {
        Self::new(transport.notifications(), disconnect, capacity)
    }

    /// Every dissected message, before any parsing.
    pub fn inbound(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.messages.subscribe()
    }

    /// The disconnect signal bounding all reply streams.
    pub fn disconnect_token(&self) -> CancellationToken {
        self.inner.disconnect.clone()
    }

    /// Typed reply channel for one parser.
    ///
    /// The first call for a parser type starts its parse pump; later calls
    /// return the same shared channel.
    pub fn replies<P: MessageParser>(&self, parser: P) -> ReplyChannel<P::Output> {
        let mut channels = self.inner.channels.lock();
        let key = TypeId::of::<P>();
        if let Some(existing) = channels
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<ReplyChannel<P::Output>>())
        {
            return existing.clone();
        }

        let (tx, _) = broadcast::channel(self.inner.capacity);
        tokio::spawn(run_parser(
            parser,
            self.inner.messages.subscribe(),
            tx.clone(),
            self.inner.disconnect.clone(),
        ));
        debug!(message_type = %P::MESSAGE_TYPE, "reply channel created");

        let channel = ReplyChannel {
            tx,
            disconnect: self.inner.disconnect.clone(),
            filter: None,
        };
        channels.insert(key, Box::new(channel.clone()));
        channel
    }
}

impl std::fmt::Debug for ReplyDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyDispatcher")
            .field("disconnected", &self.inner.disconnect.is_cancelled())
            .field("channels", &self.inner.channels.lock().len())
            .finish()
    }
}

async fn run_dissector(
    mut notifications: broadcast::Receiver<Bytes>,
    messages: broadcast::Sender<InboundMessage>,
    disconnect: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = disconnect.cancelled() => break,
            received = notifications.recv() => received,
        };
        match received {
            Ok(raw) => match dissect(raw) {
                Ok(message) => {
                    trace!(message_type = %message.message_type(), len = message.payload.len(), "inbound message");
                    let _ = messages.send(message);
                }
                Err(err) => warn!(%err, "dropping undecodable notification"),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "inbound dissector lagged behind notifications");
            }
            Err(RecvError::Closed) => {
                debug!("notification source closed");
                disconnect.cancel();
                break;
            }
        }
    }
}

async fn run_parser<P: MessageParser>(
    parser: P,
    mut messages: broadcast::Receiver<InboundMessage>,
    replies: broadcast::Sender<P::Output>,
    disconnect: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = disconnect.cancelled() => break,
            received = messages.recv() => received,
        };
        match received {
            Ok(message) if message.message_type() == P::MESSAGE_TYPE => {
                match parser.parse(&message) {
                    Ok(reply) => {
                        let _ = replies.send(reply);
                    }
                    Err(err) => warn!(%err, message_type = %P::MESSAGE_TYPE, "dropping unparsable reply"),
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, message_type = %P::MESSAGE_TYPE, "reply parser lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Shared, typed stream of one reply kind.
pub struct ReplyChannel<T> {
    tx: broadcast::Sender<T>,
    disconnect: CancellationToken,
    filter: Option<ReplyFilter<T>>,
}

impl<T> Clone for ReplyChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            disconnect: self.disconnect.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ReplyChannel<T> {
    /// Start receiving replies published from now on.
    pub fn subscribe(&self) -> ReplyStream<T> {
        ReplyStream {
            rx: self.tx.subscribe(),
            disconnect: self.disconnect.clone(),
            filter: self.filter.clone(),
        }
    }

    /// Narrow the channel to replies accepted by `predicate`.
    ///
    /// Parsing stays shared; only delivery is filtered.
    pub fn matching<F>(&self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let filter: ReplyFilter<T> = match self.filter.clone() {
            Some(previous) => Arc::new(move |reply: &T| previous(reply) && predicate(reply)),
            None => Arc::new(predicate),
        };
        Self {
            tx: self.tx.clone(),
            disconnect: self.disconnect.clone(),
            filter: Some(filter),
        }
    }

    /// Number of live subscribers on the shared channel.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One subscriber's view of a [`ReplyChannel`].
pub struct ReplyStream<T> {
    rx: broadcast::Receiver<T>,
    disconnect: CancellationToken,
    filter: Option<ReplyFilter<T>>,
}

impl<T: Clone + Send + 'static> ReplyStream<T> {
    /// Next accepted reply, or `None` once the hub disconnects.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.disconnect.cancelled() => return None,
                received = self.rx.recv() => received,
            };
            match received {
                Ok(reply) => {
                    if self.filter.as_ref().is_none_or(|accept| accept(&reply)) {
                        return Some(reply);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "reply subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

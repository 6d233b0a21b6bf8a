use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hubwire_frame::{FeedbackParser, GenericErrorParser, RawMessage, RawPortOutputCommandMessage};
use hubwire_transport::HubTransport;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::OutboundChannel;
use crate::config::MessengerConfig;
use crate::error::{MessengerError, Result};
use crate::inbound::{ReplyChannel, ReplyDispatcher};
use crate::lanes::LaneTable;
use crate::queue::{LaneContext, TaskQueue};
use crate::result::{result_channel, CommandResult, ResultSender};
use crate::task::{PortCommandExecutionStatus, Task};

/// One request of a [`OutboundMessenger::send_with_response`] sequence.
pub struct ResponseRequest<T> {
    pub message: RawMessage,
    /// Where the reply to `message` arrives.
    pub replies: ReplyChannel<T>,
}

impl<T> ResponseRequest<T> {
    pub fn new(message: RawMessage, replies: ReplyChannel<T>) -> Self {
        Self { message, replies }
    }
}

/// Routes commands to lanes and hands out their results.
///
/// Holds one generic lane for messages that are not port output commands
/// and one lane per commanded port. Every send returns a cold
/// [`CommandResult`]: nothing is enqueued until it is first polled.
pub struct OutboundMessenger {
    dispatcher: ReplyDispatcher,
    generic: Arc<TaskQueue>,
    lanes: Mutex<LaneTable>,
    disposed: AtomicBool,
}

impl OutboundMessenger {
    /// Wire a messenger onto `transport`, sharing an existing dispatcher.
    pub fn new(
        transport: Arc<dyn HubTransport>,
        dispatcher: &ReplyDispatcher,
        config: MessengerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let context = Arc::new(LaneContext {
            channel: Arc::new(OutboundChannel::new(transport, config.write_mode)),
            generic_errors: dispatcher.replies(GenericErrorParser),
            feedback: dispatcher.replies(FeedbackParser),
            config,
        });
        debug!(write_mode = ?context.config.write_mode, "messenger created");

        Ok(Self {
            dispatcher: dispatcher.clone(),
            generic: Arc::new(TaskQueue::new("generic", Arc::clone(&context))),
            lanes: Mutex::new(LaneTable::new(context)),
            disposed: AtomicBool::new(false),
        })
    }

    /// Wire a messenger with its own dispatcher over `transport`'s
    /// notifications.
    pub fn for_transport(transport: Arc<dyn HubTransport>, config: MessengerConfig) -> Result<Self> {
        config.validate()?;
        let dispatcher = ReplyDispatcher::for_transport(
            transport.as_ref(),
            CancellationToken::new(),
            config.reply_buffer,
        );
        Self::new(transport, &dispatcher, config)
    }

    /// Reply dispatcher this messenger listens on.
    pub fn dispatcher(&self) -> &ReplyDispatcher {
        &self.dispatcher
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fire-and-forget on the generic lane.
    pub fn send_without_response(&self, message: RawMessage) -> CommandResult<()> {
        if self.is_disposed() {
            return CommandResult::failed(MessengerError::Disposed);
        }
        let (task, result) = Task::without_response(message);
        let lane = Arc::clone(&self.generic);
        result.deferred(move || lane.enqueue(task))
    }

    /// Send requests on the generic lane, each after the previous settles.
    ///
    /// The result is the last request's reply. An error on any request
    /// fails the whole sequence; a request that ends without a reply ends
    /// the sequence without a value.
    pub fn send_with_response<T>(&self, requests: Vec<ResponseRequest<T>>) -> CommandResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return CommandResult::failed(MessengerError::Disposed);
        }
        let lane = Arc::clone(&self.generic);
        let mut requests = requests;
        match requests.len() {
            0 => CommandResult::empty(),
            1 => {
                let Some(request) = requests.pop() else {
                    return CommandResult::empty();
                };
                let (task, result) = Task::with_response(request.message, request.replies);
                result.deferred(move || lane.enqueue(task))
            }
            _ => {
                let (sender, result) = result_channel();
                result.deferred(move || {
                    tokio::spawn(run_sequence(lane, requests, sender));
                })
            }
        }
    }

    /// Port output command on the lane of its port.
    ///
    /// The lane exists from this call on, even if the result is never
    /// polled.
    pub fn send_port_output_command(
        &self,
        message: RawPortOutputCommandMessage,
    ) -> CommandResult<PortCommandExecutionStatus> {
        if self.is_disposed() {
            return CommandResult::failed(MessengerError::Disposed);
        }
        let lane = self.lanes.lock().lane_for(message.port_id);
        let (task, result) = Task::port_output_command(message);
        result.deferred(move || lane.enqueue(task))
    }

    /// The generic lane.
    pub fn generic_lane(&self) -> &TaskQueue {
        &self.generic
    }

    /// The lane for `port`, if one was created.
    pub fn port_lane(&self, port: u8) -> Option<Arc<TaskQueue>> {
        self.lanes.lock().get(port)
    }

    /// Ports that have a lane, ascending.
    pub fn port_ids(&self) -> Vec<u8> {
        self.lanes.lock().port_ids()
    }

    /// Dispose the generic lane and every port lane.
    ///
    /// Unsettled commands complete without a value. Later sends fail with
    /// [`MessengerError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.generic.dispose();
        self.lanes.lock().dispose_all();
        debug!("messenger disposed");
    }
}

impl Drop for OutboundMessenger {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for OutboundMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundMessenger")
            .field("generic", &self.generic)
            .field("lanes", &*self.lanes.lock())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

async fn run_sequence<T>(
    lane: Arc<TaskQueue>,
    requests: Vec<ResponseRequest<T>>,
    sender: ResultSender<T>,
) where
    T: Clone + Send + Sync + 'static,
{
    let total = requests.len();
    let mut last = None;
    for (index, request) in requests.into_iter().enumerate() {
        if lane.is_disposed() {
            debug!(index, total, "lane disposed mid-sequence");
            sender.discard();
            return;
        }
        let (task, result) = Task::with_response(request.message, request.replies);
        lane.enqueue(task);
        match result.last().await {
            Ok(Some(reply)) => last = Some(reply),
            Ok(None) => {
                debug!(index, total, "request sequence ended without reply");
                sender.discard();
                return;
            }
            Err(err) => {
                sender.fail(err);
                return;
            }
        }
    }
    match last {
        Some(reply) => sender.complete_with(reply),
        None => sender.discard(),
    };
}

#[cfg(test)]
mod tests {
    use hubwire_frame::{HubProperty, HubPropertyReplyParser, MessageType};
    use hubwire_transport::MemoryTransport;

    use super::*;

    fn messenger() -> (Arc<MemoryTransport>, OutboundMessenger) {
        let transport = Arc::new(MemoryTransport::new());
        let messenger = OutboundMessenger::for_transport(transport.clone(), MessengerConfig::default())
            .expect("default config is valid");
        (transport, messenger)
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let transport = Arc::new(MemoryTransport::new());
        let config = MessengerConfig {
            reply_buffer: 0,
            ..MessengerConfig::default()
        };
        let err = OutboundMessenger::for_transport(transport, config).unwrap_err();
        assert!(matches!(err, MessengerError::Config { field: "reply_buffer", .. }));
    }

    #[tokio::test]
    async fn port_lane_exists_before_first_poll() {
        let (transport, messenger) = messenger();
        let cmd = RawPortOutputCommandMessage::new(4, false, vec![0x04, 0x10, 0x51, 0x00, 0x00]);
        let result = messenger.send_port_output_command(cmd);

        assert_eq!(messenger.port_ids(), vec![4]);
        assert!(!result.is_started());
        assert_eq!(transport.write_count(), 0);

        assert_eq!(
            result.last().await.unwrap(),
            Some(PortCommandExecutionStatus::Completed)
        );
        assert_eq!(transport.write_count(), 1);
    }

    #[tokio::test]
    async fn empty_sequence_completes_without_value() {
        let (_transport, messenger) = messenger();
        let result = messenger.send_with_response::<hubwire_frame::HubPropertyReply>(Vec::new());
        assert_eq!(result.last().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sequence_on_disposed_lane_ends_without_value() {
        let transport = Arc::new(MemoryTransport::new());
        let (context, dispatcher) = LaneContext::for_memory(&transport, MessengerConfig::default());
        let lane = Arc::new(TaskQueue::new("generic", context));
        lane.dispose();

        let request = ResponseRequest::new(
            hubwire_frame::hub_property::request_update(HubProperty::Rssi),
            dispatcher.replies(HubPropertyReplyParser),
        );
        let (sender, result) = result_channel();
        run_sequence(lane, vec![request], sender).await;

        assert_eq!(result.last().await.unwrap(), None);
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test]
    async fn sends_after_dispose_fail() {
        let (transport, messenger) = messenger();
        messenger.dispose();
        messenger.dispose();

        let result = messenger.send_without_response(RawMessage::new(MessageType::HubActions, vec![0x01]));
        assert!(matches!(result.last().await, Err(MessengerError::Disposed)));

        let replies = messenger.dispatcher().replies(HubPropertyReplyParser);
        let request = ResponseRequest::new(
            hubwire_frame::hub_property::request_update(HubProperty::Button),
            replies,
        );
        let result = messenger.send_with_response(vec![request]);
        assert!(matches!(result.last().await, Err(MessengerError::Disposed)));
        assert_eq!(transport.write_count(), 0);
        assert!(messenger.generic_lane().is_disposed());
    }
}

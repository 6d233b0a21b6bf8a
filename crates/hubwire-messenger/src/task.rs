use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_core::future::BoxFuture;
use hubwire_frame::{frame_message, MessageType, RawMessage, RawPortOutputCommandMessage};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, trace};

use crate::channel::OutboundChannel;
use crate::error::{MessengerError, Result};
use crate::inbound::ReplyChannel;
use crate::result::{result_channel, CommandResult, Lifecycle, ResultSender};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> u64 {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Status values a port output command reports to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortCommandExecutionStatus {
    /// The hub accepted the command and started executing it.
    InProgress,
    Completed,
    Discarded,
    ExecutionError,
}

impl PortCommandExecutionStatus {
    /// Whether this status ends the command's result stream.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Discarded => "discarded",
            Self::ExecutionError => "execution_error",
        }
    }
}

impl std::fmt::Display for PortCommandExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Internal state of a port output command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortCommandState {
    /// Enqueued, not yet written.
    Pending,
    /// Written; no feedback seen since the last write.
    WaitingForResponse,
    /// The hub reported the command as running.
    InProgress,
}

impl PortCommandState {
    /// Whether moving from `self` to `next` is legal.
    ///
    /// Staying in the same state is always allowed; retransmission writes
    /// a waiting task again.
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next
            || matches!(
                (self, next),
                (Self::Pending, Self::WaitingForResponse)
                    | (Self::WaitingForResponse, Self::InProgress)
                    | (Self::InProgress, Self::WaitingForResponse)
            )
    }
}

/// One queued command.
#[derive(Clone)]
pub(crate) enum Task {
    WithoutResponse(Arc<WithoutResponseTask>),
    WithResponse(Arc<WithResponseTask>),
    PortOutputCommand(Arc<PortOutputCommandTask>),
}

impl Task {
    pub(crate) fn without_response(message: RawMessage) -> (Self, CommandResult<()>) {
        let (result, handle) = result_channel();
        let task = WithoutResponseTask {
            id: next_task_id(),
            message,
            result,
        };
        (Self::WithoutResponse(Arc::new(task)), handle)
    }

    pub(crate) fn with_response<T>(
        message: RawMessage,
        replies: ReplyChannel<T>,
    ) -> (Self, CommandResult<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let (result, handle) = result_channel();
        let task = WithResponseTask {
            id: next_task_id(),
            message,
            reply: Box::new(TypedReply {
                replies,
                result: Arc::new(result),
            }),
        };
        (Self::WithResponse(Arc::new(task)), handle)
    }

    pub(crate) fn port_output_command(
        message: RawPortOutputCommandMessage,
    ) -> (Self, CommandResult<PortCommandExecutionStatus>) {
        let (result, handle) = result_channel();
        let (signal, _) = watch::channel(0);
        let task = PortOutputCommandTask {
            id: next_task_id(),
            message,
            state: Mutex::new(PortCommandState::Pending),
            result,
            signal,
        };
        (Self::PortOutputCommand(Arc::new(task)), handle)
    }

    pub(crate) fn id(&self) -> u64 {
        match self {
            Self::WithoutResponse(task) => task.id,
            Self::WithResponse(task) => task.id,
            Self::PortOutputCommand(task) => task.id,
        }
    }

    pub(crate) fn message_type(&self) -> MessageType {
        match self {
            Self::WithoutResponse(task) => task.message.message_type,
            Self::WithResponse(task) => task.message.message_type,
            Self::PortOutputCommand(task) => task.message.message.message_type,
        }
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        match self {
            Self::WithoutResponse(task) => task.result.lifecycle(),
            Self::WithResponse(task) => task.reply.lifecycle(),
            Self::PortOutputCommand(task) => task.result.lifecycle(),
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.lifecycle().is_terminated()
    }

    /// Run one attempt: write the framed message and wait for whatever
    /// settles this kind of task.
    ///
    /// The write is appended to the channel when this is called; the
    /// returned future only observes it.
    pub(crate) fn execute(&self, channel: &OutboundChannel) -> BoxFuture<'static, Result<()>> {
        match self {
            Self::WithoutResponse(task) => Arc::clone(task).execute(channel),
            Self::WithResponse(task) => Arc::clone(task).execute(channel),
            Self::PortOutputCommand(task) => Arc::clone(task).execute(channel),
        }
    }

    /// Complete the result without a value.
    pub(crate) fn discard(&self) {
        match self {
            Self::WithoutResponse(task) => {
                task.result.discard();
            }
            Self::WithResponse(task) => task.reply.discard(),
            Self::PortOutputCommand(task) => task.discard(),
        }
    }

    /// Terminate the result with `err`.
    pub(crate) fn emit_error(&self, err: MessengerError) {
        match self {
            Self::WithoutResponse(task) => {
                task.result.fail(err);
            }
            Self::WithResponse(task) => task.reply.fail(err),
            Self::PortOutputCommand(task) => task.fail(err),
        }
    }

    /// Release the task once its queue is done with it.
    pub(crate) fn dispose(&self) {
        if !self.is_terminated() {
            self.discard();
        }
        trace!(task = self.id(), "task disposed");
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::WithoutResponse(_) => "without_response",
            Self::WithResponse(_) => "with_response",
            Self::PortOutputCommand(_) => "port_output_command",
        };
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("kind", &kind)
            .field("message_type", &self.message_type())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

fn frame_failed(err: hubwire_frame::FrameError) -> BoxFuture<'static, Result<()>> {
    Box::pin(std::future::ready(Err(MessengerError::from(err))))
}

pub(crate) struct WithoutResponseTask {
    id: u64,
    message: RawMessage,
    result: ResultSender<()>,
}

impl WithoutResponseTask {
    fn execute(self: Arc<Self>, channel: &OutboundChannel) -> BoxFuture<'static, Result<()>> {
        let packet = match frame_message(&self.message) {
            Ok(packet) => packet,
            Err(err) => return frame_failed(err),
        };
        let write = channel.send_message(packet, None);
        Box::pin(async move {
            write.await?;
            self.result.complete_with(());
            Ok(())
        })
    }
}

pub(crate) struct WithResponseTask {
    id: u64,
    message: RawMessage,
    reply: Box<dyn ReplyAwaiter>,
}

impl WithResponseTask {
    fn execute(self: Arc<Self>, channel: &OutboundChannel) -> BoxFuture<'static, Result<()>> {
        let packet = match frame_message(&self.message) {
            Ok(packet) => packet,
            Err(err) => return frame_failed(err),
        };
        // Subscribe before writing so a fast reply is not missed.
        let reply = self.reply.arm();
        let write = channel.send_message(packet, None);
        Box::pin(async move {
            write.await?;
            reply.await
        })
    }
}

/// Value-type-erased side of a request/response task.
trait ReplyAwaiter: Send + Sync {
    /// Subscribe now; the future completes the result with the first reply.
    fn arm(&self) -> BoxFuture<'static, Result<()>>;
    fn lifecycle(&self) -> &Lifecycle;
    fn discard(&self);
    fn fail(&self, err: MessengerError);
}

struct TypedReply<T> {
    replies: ReplyChannel<T>,
    result: Arc<ResultSender<T>>,
}

impl<T> ReplyAwaiter for TypedReply<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn arm(&self) -> BoxFuture<'static, Result<()>> {
        let mut stream = self.replies.subscribe();
        let result = Arc::clone(&self.result);
        Box::pin(async move {
            match stream.recv().await {
                Some(reply) => {
                    result.complete_with(reply);
                    Ok(())
                }
                None => Err(MessengerError::Disconnected),
            }
        })
    }

    fn lifecycle(&self) -> &Lifecycle {
        self.result.lifecycle()
    }

    fn discard(&self) {
        self.result.discard();
    }

    fn fail(&self, err: MessengerError) {
        self.result.fail(err);
    }
}

/// A port output command and its feedback-driven state machine.
pub(crate) struct PortOutputCommandTask {
    id: u64,
    message: RawPortOutputCommandMessage,
    state: Mutex<PortCommandState>,
    result: ResultSender<PortCommandExecutionStatus>,
    /// Bumped on every status change so `execute` can observe it.
    signal: watch::Sender<u64>,
}

impl PortOutputCommandTask {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn port_id(&self) -> u8 {
        self.message.port_id
    }

    pub(crate) fn state(&self) -> PortCommandState {
        *self.state.lock()
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        self.result.lifecycle()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.result.is_terminated()
    }

    fn execute(self: Arc<Self>, channel: &OutboundChannel) -> BoxFuture<'static, Result<()>> {
        let packet = match frame_message(&self.message.message) {
            Ok(packet) => packet,
            Err(err) => return frame_failed(err),
        };

        if !self.message.wait_for_feedback {
            let write = channel.send_message(packet, None);
            return Box::pin(async move {
                write.await?;
                self.result.complete_with(PortCommandExecutionStatus::Completed);
                Ok(())
            });
        }

        let mut changed = self.signal.subscribe();
        let task = Arc::clone(&self);
        let before_send = Box::new(move || {
            if let Err(err) = task.transition(PortCommandState::WaitingForResponse) {
                task.fail(err);
            }
        });
        let write = channel.send_message(packet, Some(before_send));
        Box::pin(async move {
            write.await?;
            // The sender lives as long as the task; a closed signal means
            // the task is gone and there is nothing left to observe.
            let _ = changed.changed().await;
            Ok(())
        })
    }

    fn transition(&self, next: PortCommandState) -> Result<()> {
        let mut state = self.state.lock();
        let current = *state;
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            error!(task = self.id, port = self.message.port_id, from = ?current, to = ?next, "invalid port command transition");
            return Err(MessengerError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        debug!(task = self.id, port = self.message.port_id, from = ?current, to = ?next, "port command transition");
        *state = next;
        Ok(())
    }

    /// Apply a feedback-derived status.
    pub(crate) fn set_status(&self, status: PortCommandExecutionStatus) {
        if self.is_terminated() {
            return;
        }
        if status.is_terminal() {
            debug!(task = self.id, port = self.message.port_id, %status, "port command finished");
            self.result.complete_with(status);
        } else {
            match self.transition(PortCommandState::InProgress) {
                Ok(()) => {
                    self.result.emit(status);
                }
                Err(err) => {
                    self.result.fail(err);
                }
            }
        }
        self.bump();
    }

    fn fail(&self, err: MessengerError) {
        self.result.fail(err);
        self.bump();
    }

    fn discard(&self) {
        self.result.discard();
        self.bump();
    }

    fn bump(&self) {
        self.signal.send_modify(|count| *count = count.wrapping_add(1));
    }
}

#[cfg(test)]
impl PortOutputCommandTask {
    pub(crate) fn force_state(&self, state: PortCommandState) {
        *self.state.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use hubwire_transport::{MemoryTransport, WriteBehavior};

    use super::*;
    use crate::config::WriteMode;

    fn port_command(port: u8, wait: bool) -> RawPortOutputCommandMessage {
        RawPortOutputCommandMessage::new(port, wait, Bytes::from(vec![port, 0x11, 0x51, 0x00, 0x32]))
    }

    fn port_task(task: &Task) -> &Arc<PortOutputCommandTask> {
        match task {
            Task::PortOutputCommand(task) => task,
            other => panic!("expected port output command, got {other:?}"),
        }
    }

    #[test]
    fn transition_table() {
        use PortCommandState::*;
        assert!(Pending.can_transition_to(WaitingForResponse));
        assert!(WaitingForResponse.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(WaitingForResponse));
        assert!(WaitingForResponse.can_transition_to(WaitingForResponse));
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Pending));
        assert!(!WaitingForResponse.can_transition_to(Pending));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!PortCommandExecutionStatus::InProgress.is_terminal());
        assert!(PortCommandExecutionStatus::Completed.is_terminal());
        assert!(PortCommandExecutionStatus::Discarded.is_terminal());
        assert!(PortCommandExecutionStatus::ExecutionError.is_terminal());
    }

    #[tokio::test]
    async fn invalid_transition_fails_task() {
        let (task, result) = Task::port_output_command(port_command(1, true));
        port_task(&task).set_status(PortCommandExecutionStatus::InProgress);

        assert!(task.is_terminated());
        assert!(matches!(
            result.last().await,
            Err(MessengerError::InvalidTransition {
                from: PortCommandState::Pending,
                to: PortCommandState::InProgress,
            })
        ));
    }

    #[tokio::test]
    async fn feedback_drives_port_command() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = OutboundChannel::new(transport.clone(), WriteMode::WithoutResponse);
        let (task, result) = Task::port_output_command(port_command(2, true));
        let port = Arc::clone(port_task(&task));

        let attempt = tokio::spawn(task.execute(&channel));
        while port.state() != PortCommandState::WaitingForResponse {
            tokio::task::yield_now().await;
        }
        port.set_status(PortCommandExecutionStatus::InProgress);
        attempt.await.unwrap().unwrap();
        assert_eq!(port.state(), PortCommandState::InProgress);

        port.set_status(PortCommandExecutionStatus::Completed);
        port.set_status(PortCommandExecutionStatus::Discarded);
        assert_eq!(
            result.collect().await.unwrap(),
            vec![
                PortCommandExecutionStatus::InProgress,
                PortCommandExecutionStatus::Completed
            ]
        );
        assert_eq!(transport.writes()[0].data.as_ref(), &[0x06, 0x00, 0x81, 0x02, 0x11, 0x51, 0x00, 0x32]);
    }

    #[tokio::test]
    async fn no_feedback_completes_after_write() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = OutboundChannel::new(transport.clone(), WriteMode::WithoutResponse);
        let (task, result) = Task::port_output_command(port_command(0, false));

        task.execute(&channel).await.unwrap();
        assert_eq!(port_task(&task).state(), PortCommandState::Pending);
        assert_eq!(
            result.last().await.unwrap(),
            Some(PortCommandExecutionStatus::Completed)
        );
    }

    #[tokio::test]
    async fn failed_write_is_returned() {
        let transport = Arc::new(MemoryTransport::new());
        transport.push_behavior(WriteBehavior::Fail("gatt error".to_string()));
        let channel = OutboundChannel::new(transport.clone(), WriteMode::WithoutResponse);
        let (task, _result) = Task::without_response(RawMessage::new(MessageType::HubActions, vec![0x01]));

        let err = task.execute(&channel).await.unwrap_err();
        assert!(matches!(err, MessengerError::Transport(_)));
        assert!(!task.is_terminated());
    }

    #[tokio::test]
    async fn oversize_message_fails_before_write() {
        let transport = Arc::new(MemoryTransport::new());
        let channel = OutboundChannel::new(transport.clone(), WriteMode::WithoutResponse);
        let (task, _result) =
            Task::without_response(RawMessage::new(MessageType::HubActions, vec![0u8; 200]));

        let err = task.execute(&channel).await.unwrap_err();
        assert!(matches!(err, MessengerError::Frame(_)));
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_discards_unfinished_task() {
        let (task, result) = Task::without_response(RawMessage::new(MessageType::HubActions, vec![0x02]));
        task.dispose();
        let drained = tokio::time::timeout(Duration::from_secs(1), result.last()).await;
        assert_eq!(drained.expect("result should complete").unwrap(), None);
    }
}

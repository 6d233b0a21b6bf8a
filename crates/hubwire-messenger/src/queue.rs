use std::collections::VecDeque;
use std::sync::Arc;

use hubwire_frame::{GenericErrorMessage, PortOutputCommandFeedbackMessage};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::OutboundChannel;
use crate::config::MessengerConfig;
use crate::error::{MessengerError, Result};
use crate::feedback::FeedbackCorrelator;
use crate::inbound::ReplyChannel;
use crate::task::Task;

/// Everything a lane needs from its messenger.
pub(crate) struct LaneContext {
    pub(crate) channel: Arc<OutboundChannel>,
    pub(crate) generic_errors: ReplyChannel<GenericErrorMessage>,
    pub(crate) feedback: ReplyChannel<PortOutputCommandFeedbackMessage>,
    pub(crate) config: MessengerConfig,
}

/// Serialized execution context for one lane.
pub struct TaskQueue {
    label: String,
    tasks: Arc<Mutex<VecDeque<Task>>>,
    tx: mpsc::UnboundedSender<Task>,
    correlator: FeedbackCorrelator,
    cancel: CancellationToken,
}

impl TaskQueue {
    pub(crate) fn new(label: impl Into<String>, context: Arc<LaneContext>) -> Self {
        let label = label.into();
        let tasks = Arc::new(Mutex::new(VecDeque::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let correlator = FeedbackCorrelator::new(&context.feedback);

        tokio::spawn(run_lane(
            label.clone(),
            rx,
            Arc::clone(&tasks),
            context,
            cancel.clone(),
        ));
        debug!(lane = %label, "lane created");

        Self {
            label,
            tasks,
            tx,
            correlator,
            cancel,
        }
    }

    /// Lane name used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Tasks enqueued and not yet settled, including the running one.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Port output commands currently tracked for feedback on `port`.
    pub fn tracked_commands(&self, port: u8) -> usize {
        self.correlator.registered_count(port)
    }

    pub(crate) fn enqueue(&self, task: Task) {
        {
            // Checked under the list lock so `dispose` cannot drain in between.
            let mut tasks = self.tasks.lock();
            if self.is_disposed() {
                drop(tasks);
                task.emit_error(MessengerError::Disposed);
                return;
            }
            tasks.push_back(task.clone());
        }
        self.correlator.visit(&task);
        debug!(lane = %self.label, task = task.id(), message_type = %task.message_type(), "task enqueued");

        if let Err(rejected) = self.tx.send(task) {
            let task = rejected.0;
            self.tasks.lock().retain(|queued| queued.id() != task.id());
            task.emit_error(MessengerError::Disposed);
        }
    }

    /// Stop the lane and discard every unsettled task.
    ///
    /// Discarded results complete without a value and without an error.
    pub fn dispose(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let pending: Vec<Task> = {
            let mut tasks = self.tasks.lock();
            self.cancel.cancel();
            tasks.drain(..).collect()
        };
        debug!(lane = %self.label, pending = pending.len(), "lane disposed");
        for task in pending {
            task.discard();
            task.dispose();
        }
        self.correlator.dispose();
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("label", &self.label)
            .field("len", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

async fn run_lane(
    label: String,
    mut rx: mpsc::UnboundedReceiver<Task>,
    tasks: Arc<Mutex<VecDeque<Task>>>,
    context: Arc<LaneContext>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        if !task.is_terminated() {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = execute_with_retry(&task, &context) => outcome,
            };
            if let Err(err) = outcome {
                warn!(lane = %label, task = task.id(), %err, "task failed");
                task.emit_error(err);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = task.lifecycle().terminated() => {}
            }
        }

        tasks.lock().retain(|queued| queued.id() != task.id());
        task.dispose();
    }
    debug!(lane = %label, "lane worker stopped");
}

/// Run attempts until one settles, retrying only on timeout.
async fn execute_with_retry(task: &Task, context: &LaneContext) -> Result<()> {
    let timeout = context.config.message_send_timeout();
    let max_retries = context.config.max_message_send_attempts;
    let mut retry = 0;

    loop {
        match tokio::time::timeout(timeout, attempt(task, context)).await {
            Ok(outcome) => return outcome,
            Err(_) if task.is_terminated() => return Ok(()),
            Err(_) if retry >= max_retries => {
                return Err(MessengerError::Timeout(timeout));
            }
            Err(_) => {
                retry += 1;
                let delay = context.config.retry_delay(retry);
                debug!(task = task.id(), retry, ?delay, "attempt timed out; retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = task.lifecycle().terminated() => {}
                }
                if task.is_terminated() {
                    debug!(task = task.id(), retry, "task settled during backoff");
                    return Ok(());
                }
            }
        }
    }
}

/// One attempt, failed early by a generic error for the same message type.
///
/// Generic errors carry no task identity, so a rejection meant for another
/// in-flight task of the same type on another lane also matches here.
async fn attempt(task: &Task, context: &LaneContext) -> Result<()> {
    let message_type = task.message_type();
    let mut rejections = context
        .generic_errors
        .matching(move |err| err.command_type == message_type)
        .subscribe();
    let execution = task.execute(&context.channel);

    tokio::select! {
        biased;
        outcome = execution => outcome,
        Some(rejection) = rejections.recv() => Err(MessengerError::Protocol(rejection)),
    }
}

#[cfg(test)]
impl LaneContext {
    /// Lane context over an in-memory transport, plus its dispatcher.
    pub(crate) fn for_memory(
        transport: &Arc<hubwire_transport::MemoryTransport>,
        config: MessengerConfig,
    ) -> (Arc<Self>, crate::inbound::ReplyDispatcher) {
        let dispatcher = crate::inbound::ReplyDispatcher::for_transport(
            transport.as_ref(),
            CancellationToken::new(),
            config.reply_buffer,
        );
        let context = Arc::new(Self {
            channel: Arc::new(OutboundChannel::new(transport.clone(), config.write_mode)),
            generic_errors: dispatcher.replies(hubwire_frame::GenericErrorParser),
            feedback: dispatcher.replies(hubwire_frame::FeedbackParser),
            config,
        });
        (context, dispatcher)
    }
}

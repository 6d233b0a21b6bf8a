use std::collections::HashMap;
use std::sync::{Arc, Weak};

use hubwire_frame::{PortOutputCommandFeedback, PortOutputCommandFeedbackMessage};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::inbound::ReplyChannel;
use crate::task::{PortCommandExecutionStatus, PortCommandState, PortOutputCommandTask, Task};

type PortTasks = HashMap<u8, Vec<Arc<PortOutputCommandTask>>>;

const ACTIVE: &[PortCommandState] = &[
    PortCommandState::WaitingForResponse,
    PortCommandState::InProgress,
];
const WAITING: &[PortCommandState] = &[PortCommandState::WaitingForResponse];

/// Routes feedback notifications to in-flight port output commands.
pub(crate) struct FeedbackCorrelator {
    inner: Arc<CorrelatorInner>,
    cancel: CancellationToken,
}

struct CorrelatorInner {
    ports: Mutex<PortTasks>,
}

impl FeedbackCorrelator {
    /// Start consuming `feedback` notifications.
    pub(crate) fn new(feedback: &ReplyChannel<PortOutputCommandFeedbackMessage>) -> Self {
        let inner = Arc::new(CorrelatorInner {
            ports: Mutex::new(HashMap::new()),
        });
        let cancel = CancellationToken::new();
        let mut stream = feedback.subscribe();
        let pump_inner = Arc::clone(&inner);
        let pump_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    biased;
                    _ = pump_cancel.cancelled() => break,
                    message = stream.recv() => message,
                };
                let Some(message) = message else { break };
                for entry in &message.feedbacks {
                    pump_inner.handle_feedback(entry.port_id, entry.feedback);
                }
            }
            trace!("feedback pump stopped");
        });
        Self { inner, cancel }
    }

    /// Register a task if it is one the correlator tracks.
    pub(crate) fn visit(&self, task: &Task) {
        match task {
            Task::PortOutputCommand(task) => self.register(task),
            Task::WithoutResponse(_) | Task::WithResponse(_) => {}
        }
    }

    fn register(&self, task: &Arc<PortOutputCommandTask>) {
        let port = task.port_id();
        self.inner
            .ports
            .lock()
            .entry(port)
            .or_default()
            .push(Arc::clone(task));
        trace!(task = task.id(), port, "port command registered");

        let inner: Weak<CorrelatorInner> = Arc::downgrade(&self.inner);
        let id = task.id();
        task.lifecycle().on_terminal(move || {
            if let Some(inner) = inner.upgrade() {
                inner.deregister(port, id);
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn handle_feedback(&self, port: u8, feedback: PortOutputCommandFeedback) {
        self.inner.handle_feedback(port, feedback);
    }

    /// Live registrations for `port`.
    pub(crate) fn registered_count(&self, port: u8) -> usize {
        self.inner.ports.lock().get(&port).map_or(0, Vec::len)
    }

    /// Stop consuming feedback and forget every registration.
    pub(crate) fn dispose(&self) {
        self.cancel.cancel();
        self.inner.ports.lock().clear();
    }
}

impl Drop for FeedbackCorrelator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl CorrelatorInner {
    fn handle_feedback(&self, port: u8, feedback: PortOutputCommandFeedback) {
        trace!(port, feedback = feedback.to_byte(), "port feedback");

        if feedback.current_command_discarded {
            self.resolve_first(port, ACTIVE, PortCommandExecutionStatus::Discarded);
        }
        if feedback.buffer_empty_command_completed {
            self.resolve_first(port, ACTIVE, PortCommandExecutionStatus::Completed);
        }
        if feedback.busy_or_full {
            let tasks = self.live_tasks(port);
            debug!(port, count = tasks.len(), "port buffer drained; completing all");
            for task in tasks {
                task.set_status(PortCommandExecutionStatus::Completed);
            }
        }
        if feedback.execution_error {
            self.resolve_first(port, ACTIVE, PortCommandExecutionStatus::ExecutionError);
        }
        if feedback.buffer_empty_command_in_progress {
            self.resolve_first(port, WAITING, PortCommandExecutionStatus::InProgress);
        }
    }

    /// Snapshot the port's unfinished tasks, in submission order.
    ///
    /// Status changes fire deregistration hooks that take the map lock, so
    /// callers must not hold it while applying statuses.
    fn live_tasks(&self, port: u8) -> Vec<Arc<PortOutputCommandTask>> {
        self.ports
            .lock()
            .get(&port)
            .map(|tasks| {
                tasks
                    .iter()
                    .filter(|task| !task.is_terminated())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn resolve_first(
        &self,
        port: u8,
        states: &[PortCommandState],
        status: PortCommandExecutionStatus,
    ) {
        let target = self
            .live_tasks(port)
            .into_iter()
            .find(|task| states.contains(&task.state()));
        match target {
            Some(task) => task.set_status(status),
            None => trace!(port, %status, "no eligible task for feedback"),
        }
    }

    fn deregister(&self, port: u8, id: u64) {
        let mut ports = self.ports.lock();
        if let Some(tasks) = ports.get_mut(&port) {
            tasks.retain(|task| task.id() != id);
            if tasks.is_empty() {
                ports.remove(&port);
            }
        }
    }
}

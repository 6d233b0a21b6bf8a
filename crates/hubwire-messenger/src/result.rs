use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::{MessengerError, Result};

type TerminalHook = Box<dyn FnOnce() + Send + 'static>;

/// Terminal-state signal shared by a task and its observers.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

struct LifecycleInner {
    terminated: watch::Sender<bool>,
    hooks: Mutex<Vec<TerminalHook>>,
}

impl Lifecycle {
    fn new() -> Self {
        let (terminated, _) = watch::channel(false);
        Self {
            inner: Arc::new(LifecycleInner {
                terminated,
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether the result has reached a terminal state.
    pub fn is_terminated(&self) -> bool {
        *self.inner.terminated.borrow()
    }

    /// Resolve once the result is terminal.
    pub async fn terminated(&self) {
        let mut rx = self.inner.terminated.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Run `hook` once the result is terminal (immediately if it already is).
    pub fn on_terminal(&self, hook: impl FnOnce() + Send + 'static) {
        let mut hooks = self.inner.hooks.lock();
        if self.is_terminated() {
            drop(hooks);
            hook();
        } else {
            hooks.push(Box::new(hook));
        }
    }

    fn mark_terminated(&self) {
        self.inner.terminated.send_replace(true);
        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        for hook in hooks {
            hook();
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Producer side of a task's result.
pub(crate) struct ResultSender<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<Result<T>>>>,
    lifecycle: Lifecycle,
}

/// Create a connected sender and hot result handle.
pub(crate) fn result_channel<T>() -> (ResultSender<T>, CommandResult<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = ResultSender {
        tx: Mutex::new(Some(tx)),
        lifecycle: Lifecycle::new(),
    };
    (sender, CommandResult { start: None, rx })
}

impl<T> ResultSender<T> {
    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.lifecycle.is_terminated()
    }

    /// Publish a non-terminal value. Returns `false` once terminal.
    pub(crate) fn emit(&self, value: T) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => {
                let _ = tx.send(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Publish a final value and complete.
    pub(crate) fn complete_with(&self, value: T) -> bool {
        self.terminate(Some(Ok(value)))
    }

    /// Terminate with an error.
    pub(crate) fn fail(&self, err: MessengerError) -> bool {
        self.terminate(Some(Err(err)))
    }

    /// Complete without a value.
    pub(crate) fn discard(&self) -> bool {
        self.terminate(None)
    }

    fn terminate(&self, last: Option<Result<T>>) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        if let Some(last) = last {
            let _ = tx.send(last);
        }
        drop(tx);
        self.lifecycle.mark_terminated();
        true
    }
}

/// Caller side of a command: a stream of values ending in completion or
/// a single error.
///
/// Results handed out by the messenger are cold: the command is enqueued
/// on the first poll (or an explicit [`start`](Self::start)), never before.
/// Dropping the handle detaches the caller; writes already issued are not
/// retracted.
pub struct CommandResult<T> {
    start: Option<TerminalHook>,
    rx: mpsc::UnboundedReceiver<Result<T>>,
}

impl<T> CommandResult<T> {
    /// Turn a hot result into a cold one started by `start`.
    pub(crate) fn deferred(mut self, start: impl FnOnce() + Send + 'static) -> Self {
        self.start = Some(Box::new(start));
        self
    }

    /// A result that fails immediately with `err`.
    pub(crate) fn failed(err: MessengerError) -> Self {
        let (sender, result) = result_channel();
        sender.fail(err);
        result
    }

    /// A result that completes immediately without a value.
    pub(crate) fn empty() -> Self {
        let (sender, result) = result_channel();
        sender.discard();
        result
    }

    /// Enqueue the command now, if that has not happened yet.
    pub fn start(&mut self) {
        if let Some(start) = self.start.take() {
            start();
        }
    }

    /// Whether the command has been handed to its lane.
    pub fn is_started(&self) -> bool {
        self.start.is_none()
    }

    /// Next value or error; `None` once the command completes.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.start();
        self.rx.recv().await
    }

    /// Drain the result, returning the last value (if any) or the error.
    pub async fn last(mut self) -> Result<Option<T>> {
        let mut last = None;
        while let Some(item) = self.next().await {
            last = Some(item?);
        }
        Ok(last)
    }

    /// Drain the result, collecting every value or returning the error.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }
}

impl<T> Stream for CommandResult<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.start();
        this.rx.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for CommandResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandResult")
            .field("started", &self.is_started())
            .finish()
    }
}

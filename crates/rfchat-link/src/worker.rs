//! Cancellable worker tasks
//!
//! Every listener, initiator, and session runs as its own task holding the I/O
//! resource it waits on. Cancelling a worker fires its signal; the task drops
//! the resource (closing it) and exits without reporting anything. The
//! coordinator waits for the task to finish so the resource is gone before
//! the next transition is committed.

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::types::AttemptId;

/// Explicit cancellation signal handed to a worker body
pub(crate) type CancelSignal = oneshot::Receiver<()>;

pub(crate) struct Worker {
    id: AttemptId,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Worker {
    pub(crate) fn spawn<F, Fut>(id: AttemptId, body: F) -> Self
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, signal) = oneshot::channel();
        let handle = tokio::spawn(body(signal));
        Self {
            id,
            cancel: Some(cancel),
            handle,
        }
    }

    pub(crate) fn id(&self) -> AttemptId {
        self.id
    }

    /// Signal cancellation and wait for the task to release its resource
    pub(crate) async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            // The task may already have finished on its own
            let _ = cancel.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            if e.is_panic() {
                warn!("Worker {} panicked: {}", self.id, e);
            }
        }
    }
}

//! Background flush worker
//!
//! Runs a flush body once per interval, or immediately when a flush is
//! requested. A request cancels the pending timer; the timer is re-armed
//! after every flush whatever its outcome. Failed flushes are logged and
//! retried on the next tick.

use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Idle,
    Flushing,
}

/// Handle to a running flush task. Dropping it stops the task after any
/// flush in progress.
pub struct FlushWorker {
    trigger: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<WorkerState>,
    handle: Option<JoinHandle<()>>,
}

impl FlushWorker {
    /// Spawn the worker on the current tokio runtime
    pub fn start<F, Fut>(interval: Duration, flush: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);

        let task_trigger = Arc::clone(&trigger);
        let handle = tokio::spawn(async move {
            tracing::info!("Flush worker started (interval {:?})", interval);

            loop {
                state_tx.send_replace(WorkerState::Idle);
                let deadline = Instant::now() + interval;

                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = task_trigger.notified() => {
                        tracing::debug!("Flush requested");
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::debug!("Flush timer expired");
                    }
                }

                state_tx.send_replace(WorkerState::Flushing);
                if let Err(e) = flush().await {
                    tracing::error!("Background flush failed, will retry: {}", e);
                }
            }

            state_tx.send_replace(WorkerState::Stopped);
            tracing::info!("Flush worker stopped");
        });

        Self {
            trigger,
            shutdown: shutdown_tx,
            state: state_rx,
            handle: Some(handle),
        }
    }

    /// Ask for a flush now. Never blocks; repeated requests made while a
    /// flush is pending collapse into one.
    pub fn request_flush(&self) {
        self.trigger.notify_one();
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Stop the worker, waiting for a flush in progress to complete
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.shutdown.send_replace(true);
        if let Err(e) = handle.await {
            tracing::error!("Flush worker terminated abnormally: {}", e);
        }
    }
}

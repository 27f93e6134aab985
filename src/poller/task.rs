use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ApiError;
use crate::resources::{IngestionStatus, ResourceStatusSnapshot};

use super::{
    PollError, PollObserver, StatusSource, TerminalStateHook, DEFAULT_FAILURE_MESSAGE,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

pub struct ResourcePoller {
    source: Arc<dyn StatusSource>,
    observer: Arc<dyn PollObserver>,
    hook: Arc<dyn TerminalStateHook>,
    interval: Duration,
}

impl ResourcePoller {
    pub fn new(
        source: Arc<dyn StatusSource>,
        observer: Arc<dyn PollObserver>,
        hook: Arc<dyn TerminalStateHook>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            observer,
            hook,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `id` until it reaches a terminal state or an error stops the run.
    ///
    /// Fetches never overlap: the next one is scheduled `interval` after the
    /// previous one resolved. Returns the terminal snapshot, which may be
    /// `failed`; callers inspect `ingestion_status`.
    pub async fn poll_until_terminal(
        &self,
        id: &str,
    ) -> Result<ResourceStatusSnapshot, PollError> {
        let mut previous: Option<IngestionStatus> = None;

        loop {
            let snapshot = match self.source.fetch_status(id).await {
                Ok(snapshot) => snapshot,
                Err(error) => return Err(self.report(id, error)),
            };

            let status = snapshot.ingestion_status;
            if let Some(previous) = previous {
                if previous != status && !previous.can_transition_to(status) {
                    tracing::warn!(
                        resource_id = id,
                        from = %previous,
                        to = %status,
                        "status moved backwards between polls"
                    );
                }
            }
            previous = Some(status);
            self.observer.on_status(&snapshot);

            match status {
                IngestionStatus::Pending | IngestionStatus::Processing => {
                    tracing::debug!(resource_id = id, %status, "resource not ready yet");
                    tokio::time::sleep(self.interval).await;
                }
                IngestionStatus::Completed => {
                    tracing::info!(resource_id = id, "ingestion completed");
                    self.observer.on_completed(&snapshot);
                    self.hook.on_terminal(&snapshot);
                    return Ok(snapshot);
                }
                IngestionStatus::Failed => {
                    let message = snapshot
                        .ingestion_error
                        .clone()
                        .filter(|message| !message.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                    tracing::info!(resource_id = id, "ingestion failed: {message}");
                    self.observer.on_failed(&snapshot, &message);
                    self.hook.on_terminal(&snapshot);
                    return Ok(snapshot);
                }
            }
        }
    }

    fn report(&self, id: &str, error: ApiError) -> PollError {
        let error = match error {
            ApiError::NotFound(_) => PollError::NotFound(id.to_string()),
            source => PollError::Request {
                id: id.to_string(),
                source,
            },
        };
        tracing::warn!(resource_id = id, "polling stopped: {error}");
        self.observer.on_error(&error);
        error
    }

    /// Move the poller onto its own task. `initial` is the first resource to
    /// poll, or `None` to start idle.
    pub fn spawn(self, initial: Option<String>) -> PollerHandle {
        let (target, rx) = watch::channel(initial);
        let task = tokio::spawn(self.run(rx));
        PollerHandle { target, task }
    }

    async fn run(self, mut rx: watch::Receiver<Option<String>>) {
        loop {
            let current = rx.borrow_and_update().clone();
            let Some(id) = current else {
                if rx.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let finished = tokio::select! {
                result = self.poll_until_terminal(&id) => Some(result),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    tracing::debug!(resource_id = %id, "poll target changed, abandoning run");
                    None
                }
            };

            if let Some(result) = finished {
                if let Err(error) = result {
                    tracing::debug!(resource_id = %id, "poll run ended with error: {error}");
                }
                // Terminal: stay idle until a new target arrives.
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Controls a spawned poller. Dropping the handle ends the task.
pub struct PollerHandle {
    target: watch::Sender<Option<String>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Switch to another resource, or `None` to go idle. Setting the id that
    /// is already current does nothing.
    pub fn set_resource(&self, id: Option<String>) {
        self.target.send_if_modified(|current| {
            if *current == id {
                return false;
            }
            *current = id;
            true
        });
    }

    pub fn stop(&self) {
        self.set_resource(None);
    }

    pub fn resource(&self) -> Option<String> {
        self.target.borrow().clone()
    }

    /// Close the channel and wait for the task to exit.
    pub async fn shutdown(self) {
        let Self { target, task } = self;
        drop(target);
        if let Err(error) = task.await {
            tracing::warn!("poller task ended abnormally: {error}");
        }
    }
}

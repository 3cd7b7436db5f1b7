//! Retry supervisor
//!
//! Keeps one stream session open for as long as it is wanted. Opening spawns
//! a background task that retries `StreamSession::open` until it succeeds and
//! then calls it again every entry timeout so the registry lease never runs
//! out. Every outcome is reported to the status registry.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::{ConfiguredStream, ManagerConfig};
use crate::error::{Error, Result};
use crate::registry::{StatusRegistry, StreamStatus};
use crate::retry::RetryPolicy;
use crate::stream::{StreamIdentity, StreamSession};

/// A running open/refresh task
struct Episode {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Last reported status and the conduit flag gating it
///
/// The flag is checked and the status written under the same lock.
struct Reported {
    status: StreamStatus,
    transport_down: bool,
}

struct Inner {
    session: StreamSession,
    statuses: Arc<StatusRegistry>,
    config: ManagerConfig,
    reported: Mutex<Reported>,
}

impl Inner {
    fn set_status(&self, status: StreamStatus) {
        let mut reported = lock(&self.reported);
        self.publish(&mut reported, status);
    }

    /// Write `status` while holding the reported lock
    fn publish(&self, reported: &mut Reported, status: StreamStatus) {
        if status == StreamStatus::Open && reported.transport_down {
            tracing::debug!(
                stream = %self.session.identity(),
                "Conduit down, not reporting stream as open"
            );
            return;
        }
        reported.status = status;
        self.statuses.set_status(self.session.identity(), status);
    }

    /// One bounded open attempt
    async fn attempt(&self, token: &CancellationToken, max_targets: u32) -> Result<()> {
        let timeout = self.config.timeout;
        let open = self.session.open(token, max_targets);
        let result = match tokio::time::timeout(timeout, open).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        };

        match &result {
            _ if token.is_cancelled() => {
                tracing::debug!(stream = %self.session.identity(), "Open cancelled");
            }
            Ok(()) => self.set_status(StreamStatus::Open),
            Err(e) if e.is_cancelled() => {
                tracing::debug!(stream = %self.session.identity(), "Open cancelled");
            }
            Err(e) => {
                tracing::warn!(
                    stream = %self.session.identity(),
                    error = %e,
                    "Failed to open stream"
                );
                self.set_status(StreamStatus::Unavailable);
            }
        }

        result
    }

    async fn run(self: Arc<Self>, token: CancellationToken, max_targets: u32, force: bool) {
        if force {
            let jitter = self.config.draw_jitter();
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(jitter) => {}
            }
        }

        let refresh = RetryPolicy::forever(self.config.entry_timeout);
        let open = RetryPolicy::until_success(self.config.retry_delay);

        let inner = &self;
        let token = &token;
        let open = &open;

        // Only returns once cancelled
        let _ = refresh
            .run(token, move || async move {
                let _ = open
                    .run(token, move || inner.attempt(token, max_targets))
                    .await;
                Ok(())
            })
            .await;

        tracing::debug!(stream = %self.session.identity(), "Open task stopped");
    }
}

/// Supervises one stream session
pub struct RetrySupervisor {
    inner: Arc<Inner>,
    episode: Mutex<Option<Episode>>,
}

impl RetrySupervisor {
    /// Create a supervisor for `session`
    pub fn new(
        session: StreamSession,
        statuses: Arc<StatusRegistry>,
        config: ManagerConfig,
        transport_down: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                statuses,
                config,
                reported: Mutex::new(Reported {
                    status: StreamStatus::Undefined,
                    transport_down,
                }),
            }),
            episode: Mutex::new(None),
        }
    }

    /// Get the stream identity
    pub fn identity(&self) -> &StreamIdentity {
        self.inner.session.identity()
    }

    /// Get the supervised session
    pub fn session(&self) -> &StreamSession {
        &self.inner.session
    }

    /// Last status set by this supervisor
    pub fn status(&self) -> StreamStatus {
        lock(&self.inner.reported).status
    }

    /// Check if the open/refresh task is running
    pub fn is_running(&self) -> bool {
        lock(&self.episode)
            .as_ref()
            .is_some_and(|episode| !episode.handle.is_finished())
    }

    /// Check if the conduit is known to be down
    pub fn is_transport_down(&self) -> bool {
        lock(&self.inner.reported).transport_down
    }

    /// Start the open/refresh task.
    ///
    /// Does nothing if a task is already running, unless `force` is set, in
    /// which case the running task is cancelled and a new one starts after a
    /// short random delay.
    pub fn open(&self, stream: &ConfiguredStream, force: bool) {
        let mut episode = lock(&self.episode);

        if let Some(running) = episode.as_ref() {
            if !force && !running.handle.is_finished() {
                return;
            }
        }
        if let Some(previous) = episode.take() {
            previous.token.cancel();
        }

        tracing::debug!(
            stream = %self.identity(),
            max_targets = stream.max_targets,
            force = force,
            "Starting open task"
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.inner).run(
            token.clone(),
            stream.max_targets,
            force,
        ));
        *episode = Some(Episode { token, handle });
    }

    /// Stop the open/refresh task and close the session once.
    ///
    /// The status is left untouched; the caller decides what it becomes.
    pub async fn close(&self) -> Result<()> {
        let episode = lock(&self.episode).take();

        if let Some(episode) = episode {
            episode.token.cancel();
            if let Err(e) = episode.handle.await {
                tracing::warn!(stream = %self.identity(), error = %e, "Open task failed");
            }
        }

        let timeout = self.inner.config.timeout;
        match tokio::time::timeout(timeout, self.inner.session.close()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    /// Publish an initial status, creating the registry entry
    pub(crate) fn add_status(&self, status: StreamStatus) {
        let mut reported = lock(&self.inner.reported);
        reported.status = status;
        self.inner.statuses.add(self.identity(), status);
    }

    /// Report a status (open is held back while the conduit is down)
    pub fn set_status(&self, status: StreamStatus) {
        self.inner.set_status(status);
    }

    /// React to the conduit going down or coming back.
    ///
    /// Down marks the stream unavailable right away. Up restarts the task
    /// (when `stream` is configured) instead of waiting for the next retry;
    /// without a stream the caller sets the status to report.
    pub fn conduit_change(&self, is_down: bool, stream: Option<&ConfiguredStream>) {
        let was_down = {
            let mut reported = lock(&self.inner.reported);
            let was_down = std::mem::replace(&mut reported.transport_down, is_down);
            if is_down {
                self.inner.publish(&mut reported, StreamStatus::Unavailable);
            }
            was_down
        };

        if is_down {
            if !was_down {
                tracing::info!(stream = %self.identity(), "Conduit down");
            }
            return;
        }

        if was_down {
            tracing::info!(stream = %self.identity(), "Conduit up");
            if let Some(stream) = stream {
                self.open(stream, true);
            }
        }
    }
}

impl Drop for RetrySupervisor {
    fn drop(&mut self) {
        if let Some(episode) = lock(&self.episode).take() {
            episode.token.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

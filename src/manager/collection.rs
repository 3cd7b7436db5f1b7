//! Stream collection manager
//!
//! Owns the supervisors of every stream tracked for one conduit and keeps
//! them in line with the configured streams, the running state and the
//! conduit connectivity.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;

use super::config::{ConfiguredStream, ManagerConfig};
use super::supervisor::RetrySupervisor;
use crate::client::{Conduit, TargetRegistry};
use crate::error::{Error, Result};
use crate::registry::{StatusRegistry, StreamStatus};
use crate::stream::{StreamIdentity, StreamSession};

#[derive(Default)]
struct State {
    sessions: HashMap<StreamIdentity, RetrySupervisor>,
    configured: HashMap<StreamIdentity, ConfiguredStream>,
    running: bool,
    transport_down: bool,
}

/// Manages the streams of one conduit
pub struct StreamManager {
    config: ManagerConfig,
    registry: Arc<dyn TargetRegistry>,
    conduit: Arc<dyn Conduit>,
    statuses: Arc<StatusRegistry>,
    state: Mutex<State>,
}

impl StreamManager {
    /// Create a stopped manager
    pub fn new(
        config: ManagerConfig,
        registry: Arc<dyn TargetRegistry>,
        conduit: Arc<dyn Conduit>,
        statuses: Arc<StatusRegistry>,
    ) -> Self {
        Self {
            config,
            registry,
            conduit,
            statuses,
            state: Mutex::new(State::default()),
        }
    }

    /// Get the status registry streams report to
    pub fn status_registry(&self) -> &Arc<StatusRegistry> {
        &self.statuses
    }

    /// Get the configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Check if the manager is running
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Identities of all tracked streams, opened or not
    pub async fn streams(&self) -> Vec<StreamIdentity> {
        let state = self.state.lock().await;
        let mut streams: Vec<StreamIdentity> = state.sessions.keys().cloned().collect();
        streams.sort();
        streams
    }

    /// Start tracking a stream.
    ///
    /// The stream is opened right away when the manager runs and the stream
    /// is configured. Tracking an already tracked stream does nothing.
    pub async fn add_stream(&self, identity: StreamIdentity) {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&identity) {
            return;
        }

        let session = StreamSession::new(
            identity.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.conduit),
        );
        let supervisor = RetrySupervisor::new(
            session,
            Arc::clone(&self.statuses),
            self.config.clone(),
            state.transport_down,
        );

        if !state.running {
            supervisor.add_status(StreamStatus::Unavailable);
        } else if let Some(stream) = state.configured.get(&identity) {
            supervisor.add_status(StreamStatus::Pending);
            supervisor.open(stream, false);
        } else {
            supervisor.add_status(StreamStatus::Undefined);
        }

        tracing::info!(stream = %identity, running = state.running, "Stream added");
        state.sessions.insert(identity, supervisor);
    }

    /// Stop tracking a stream.
    ///
    /// Closes the stream and removes it from the status registry. Returns
    /// the close error, if any; the stream is removed either way.
    pub async fn remove_stream(&self, identity: &StreamIdentity) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(supervisor) = state.sessions.remove(identity) else {
            return Ok(());
        };

        let result = supervisor.close().await;
        self.statuses.remove(identity);

        match &result {
            Ok(()) => tracing::info!(stream = %identity, "Stream removed"),
            Err(e) => {
                tracing::warn!(stream = %identity, error = %e, "Stream removed, close failed")
            }
        }
        result
    }

    /// Replace the configured streams.
    ///
    /// When running, configured streams are opened and the others closed
    /// and marked undefined.
    pub async fn set_streams(&self, streams: Vec<ConfiguredStream>) {
        let mut state = self.state.lock().await;

        let mut configured = HashMap::with_capacity(streams.len());
        for stream in streams {
            if !stream.identity.is_complete() {
                tracing::warn!(
                    stream = %stream.identity,
                    "Skipping incomplete stream in configuration"
                );
                continue;
            }
            configured.insert(stream.identity.clone(), stream);
        }
        tracing::debug!(count = configured.len(), "Configured streams updated");
        state.configured = configured;

        if !state.running {
            return;
        }

        let state = &*state;
        for (identity, supervisor) in &state.sessions {
            match state.configured.get(identity) {
                Some(stream) => {
                    if supervisor.status() == StreamStatus::Undefined {
                        supervisor.set_status(StreamStatus::Pending);
                    }
                    supervisor.open(stream, false);
                }
                None => {
                    if let Err(e) = supervisor.close().await {
                        tracing::warn!(
                            stream = %identity,
                            error = %e,
                            "Failed to close unconfigured stream"
                        );
                    }
                    supervisor.set_status(StreamStatus::Undefined);
                }
            }
        }
    }

    /// Start opening the configured streams
    pub async fn run(&self) {
        let mut state = self.state.lock().await;
        state.running = true;

        let state = &*state;
        for (identity, supervisor) in &state.sessions {
            match state.configured.get(identity) {
                Some(stream) => {
                    if supervisor.status() != StreamStatus::Open {
                        supervisor.set_status(StreamStatus::Pending);
                    }
                    supervisor.open(stream, false);
                }
                None => supervisor.set_status(StreamStatus::Undefined),
            }
        }

        tracing::info!(streams = state.sessions.len(), "Stream manager running");
    }

    /// Close every stream and stop.
    ///
    /// All streams are closed concurrently and marked undefined; close
    /// errors are collected rather than stopping at the first one.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let closes = state.sessions.values().map(|supervisor| async move {
            let result = supervisor.close().await;
            supervisor.set_status(StreamStatus::Undefined);
            if let Err(e) = &result {
                tracing::warn!(
                    stream = %supervisor.identity(),
                    error = %e,
                    "Failed to close stream"
                );
            }
            result
        });
        let mut errors: Vec<Error> = join_all(closes)
            .await
            .into_iter()
            .filter_map(|result| result.err())
            .collect();

        state.running = false;
        tracing::info!(failed = errors.len(), "Stream manager stopped");

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }

    /// Report conduit connectivity.
    ///
    /// Going down marks every stream unavailable and keeps it from reporting
    /// open. Coming back up restarts the configured streams and puts the
    /// others back to the status an idle stream reports.
    pub async fn conduit_down(&self, is_down: bool) {
        let mut state = self.state.lock().await;
        if state.transport_down == is_down {
            return;
        }
        state.transport_down = is_down;
        tracing::info!(down = is_down, "Conduit connectivity changed");

        let state = &*state;
        for (identity, supervisor) in &state.sessions {
            let stream = state.configured.get(identity).filter(|_| state.running);
            supervisor.conduit_change(is_down, stream);

            // Nothing to reopen, report what an idle stream would show
            if !is_down && stream.is_none() {
                let idle = if state.running {
                    StreamStatus::Undefined
                } else {
                    StreamStatus::Unavailable
                };
                supervisor.set_status(idle);
            }
        }
    }
}

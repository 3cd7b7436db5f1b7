//! Stream session and identifier allocation
//!
//! A `StreamSession` represents one target taking part in one stream. Opening
//! it claims an identifier in `[1, max_targets]` without any central
//! coordinator:
//!
//! ```text
//!   list identifiers in use ──► pick a free one at random ──► register DISABLED
//!            ▲                                                      │
//!            │          collision: unregister, pick again           ▼
//!            └────────────────────────────────────────── list again, compare
//!                                                                   │
//!                                                    no collision   ▼
//!                                                           register ENABLED
//! ```
//!
//! Targets that share our address set are left out of the identifiers in
//! use, so a stale entry of our own is never seen as a competitor. Once
//! enabled, further opens only refresh the registration and check that the
//! registry still holds it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::identity::StreamIdentity;
use super::target::{same_ip_set, Target, TargetQuery, TargetStatus};
use crate::client::{Conduit, TargetRegistry};
use crate::error::{Error, Result};

/// Local state of a session, guarded by the session lock
struct SessionState {
    /// Claimed identifier (None = unassigned)
    identifier: Option<u32>,

    /// Whether the target is registered as enabled
    enabled: bool,

    /// Addresses snapshot of the current open episode
    ips: Vec<String>,

    /// Source of identifier picks
    rng: fastrand::Rng,
}

impl SessionState {
    /// Identifier currently held, if it fits in the pool
    fn held_identifier(&self, max_targets: u32) -> Option<u32> {
        self.identifier
            .filter(|id| (1..=max_targets).contains(id))
    }

    /// Pick a random identifier in `[1, max_targets]` not listed in `in_use`
    fn pick_identifier(&mut self, max_targets: u32, in_use: &[String]) -> Result<u32> {
        let free: Vec<u32> = (1..=max_targets)
            .filter(|id| !in_use.iter().any(|used| *used == id.to_string()))
            .collect();

        if free.is_empty() {
            return Err(Error::IdentifierExhausted {
                in_use: in_use.len(),
                max_targets,
            });
        }

        let identifier = free[self.rng.usize(..free.len())];
        self.identifier = Some(identifier);
        Ok(identifier)
    }
}

/// One target registered in one stream
pub struct StreamSession {
    identity: StreamIdentity,
    registry: Arc<dyn TargetRegistry>,
    conduit: Arc<dyn Conduit>,
    state: Mutex<SessionState>,
}

impl StreamSession {
    /// Create a new session
    pub fn new(
        identity: StreamIdentity,
        registry: Arc<dyn TargetRegistry>,
        conduit: Arc<dyn Conduit>,
    ) -> Self {
        Self::with_rng(identity, registry, conduit, fastrand::Rng::new())
    }

    /// Create a session whose identifier picks are reproducible
    pub fn with_seed(
        identity: StreamIdentity,
        registry: Arc<dyn TargetRegistry>,
        conduit: Arc<dyn Conduit>,
        seed: u64,
    ) -> Self {
        Self::with_rng(identity, registry, conduit, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(
        identity: StreamIdentity,
        registry: Arc<dyn TargetRegistry>,
        conduit: Arc<dyn Conduit>,
        rng: fastrand::Rng,
    ) -> Self {
        Self {
            identity,
            registry,
            conduit,
            state: Mutex::new(SessionState {
                identifier: None,
                enabled: false,
                ips: Vec::new(),
                rng,
            }),
        }
    }

    /// Get the stream identity
    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Check whether this session belongs to `identity`
    pub fn equals(&self, identity: &StreamIdentity) -> bool {
        self.identity == *identity
    }

    /// Get the claimed identifier
    pub async fn identifier(&self) -> Option<u32> {
        self.state.lock().await.identifier
    }

    /// Check if the target is registered as enabled
    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    /// Open the session (claim an identifier and enable the target).
    ///
    /// If the target is already enabled with an identifier that fits in the
    /// pool, the registration is only refreshed. When the registry no longer
    /// holds an enabled entry for us (it expired), a full allocation follows.
    pub async fn open(&self, token: &CancellationToken, max_targets: u32) -> Result<()> {
        let mut state = self.state.lock().await;

        let ips = self.conduit.ips();
        if ips.is_empty() {
            return Err(Error::NoAddress);
        }

        if state.identifier.is_some() && !state.ips.is_empty() && !same_ip_set(&state.ips, &ips)
        {
            tracing::warn!(
                stream = %self.identity,
                old = ?state.ips,
                new = ?ips,
                "Local addresses changed, re-validating identifier"
            );
            self.unregister_best_effort(&state).await;
            state.enabled = false;
        }
        state.ips = ips;

        if state.enabled && state.held_identifier(max_targets).is_some() {
            if self.refresh(token, &state).await? {
                return Ok(());
            }
            tracing::warn!(
                stream = %self.identity,
                identifier = ?state.identifier,
                "Target no longer enabled in registry, allocating again"
            );
        }

        // Also covers an enabled identifier left outside a shrunk pool
        state.enabled = false;

        self.allocate(token, &mut state, max_targets).await
    }

    /// Close the session by unregistering the target.
    ///
    /// Does nothing if no identifier was ever assigned. The local state is
    /// reset even if the registry call fails.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        let Some(identifier) = state.identifier else {
            return Ok(());
        };

        let target = self.target(&state, TargetStatus::Disabled);
        let result = self.registry.unregister(&target).await;

        state.identifier = None;
        state.enabled = false;

        match result {
            Ok(()) => {
                tracing::info!(
                    stream = %self.identity,
                    identifier = identifier,
                    "Target unregistered"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    stream = %self.identity,
                    identifier = identifier,
                    error = %e,
                    "Failed to unregister target"
                );
                Err(e)
            }
        }
    }

    /// Extend the lease and check the registry still holds our enabled entry
    async fn refresh(&self, token: &CancellationToken, state: &SessionState) -> Result<bool> {
        self.register(token, state, TargetStatus::Enabled).await?;

        let query = TargetQuery::stream(self.identity.clone());
        let targets = cancellable(token, self.registry.get_targets(&query)).await?;

        let found = targets
            .iter()
            .any(|t| t.same_ips(&state.ips) && t.status == TargetStatus::Enabled);

        if found {
            tracing::debug!(
                stream = %self.identity,
                identifier = ?state.identifier,
                "Target refreshed"
            );
        }
        Ok(found)
    }

    async fn allocate(
        &self,
        token: &CancellationToken,
        state: &mut SessionState,
        max_targets: u32,
    ) -> Result<()> {
        let in_use = self.identifiers_in_use(token, &state.ips).await?;
        if in_use.len() >= max_targets as usize {
            return Err(Error::IdentifierExhausted {
                in_use: in_use.len(),
                max_targets,
            });
        }

        let mut identifier = match state.held_identifier(max_targets) {
            Some(identifier) => identifier,
            None => state.pick_identifier(max_targets, &in_use)?,
        };
        self.register(token, state, TargetStatus::Disabled).await?;

        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let in_use = self.identifiers_in_use(token, &state.ips).await?;
            if in_use.len() >= max_targets as usize {
                if self.unregister_best_effort(state).await {
                    state.identifier = None;
                }
                return Err(Error::IdentifierExhausted {
                    in_use: in_use.len(),
                    max_targets,
                });
            }

            if !in_use.iter().any(|used| *used == identifier.to_string()) {
                break;
            }

            self.unregister_best_effort(state).await;
            let collided = identifier;
            identifier = state.pick_identifier(max_targets, &in_use)?;
            tracing::warn!(
                stream = %self.identity,
                collided = collided,
                identifier = identifier,
                "Identifier collision, picked another one"
            );
            self.register(token, state, TargetStatus::Disabled).await?;
        }

        state.enabled = true;
        if let Err(e) = self.register(token, state, TargetStatus::Enabled).await {
            state.enabled = false;
            return Err(e);
        }

        tracing::info!(
            stream = %self.identity,
            identifier = ?state.identifier,
            ips = ?state.ips,
            "Target enabled"
        );
        Ok(())
    }

    /// Identifiers of all other targets of the stream (own address set excluded)
    async fn identifiers_in_use(
        &self,
        token: &CancellationToken,
        own_ips: &[String],
    ) -> Result<Vec<String>> {
        let query = TargetQuery::stream(self.identity.clone());
        let targets = cancellable(token, self.registry.get_targets(&query)).await?;

        Ok(targets
            .iter()
            .filter(|t| !t.same_ips(own_ips))
            .filter_map(|t| t.identifier().map(str::to_string))
            .collect())
    }

    async fn register(
        &self,
        token: &CancellationToken,
        state: &SessionState,
        status: TargetStatus,
    ) -> Result<()> {
        let target = self.target(state, status);
        cancellable(token, self.registry.register(&target)).await
    }

    /// Release the current registration, logging failures
    ///
    /// Returns whether the registry call succeeded.
    async fn unregister_best_effort(&self, state: &SessionState) -> bool {
        let target = self.target(state, TargetStatus::Disabled);
        match self.registry.unregister(&target).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    stream = %self.identity,
                    identifier = ?state.identifier,
                    error = %e,
                    "Failed to release identifier"
                );
                false
            }
        }
    }

    fn target(&self, state: &SessionState, status: TargetStatus) -> Target {
        let target = Target::new(self.identity.clone(), state.ips.clone(), status);
        match state.identifier {
            Some(identifier) => target.with_identifier(identifier),
            None => target,
        }
    }
}

/// Run a registry call, giving up as soon as `token` is cancelled
async fn cancellable<T>(
    token: &CancellationToken,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = call => result,
    }
}

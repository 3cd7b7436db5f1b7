//! In-memory target registry
//!
//! A local implementation of [`TargetRegistry`] with the same lease
//! semantics as the registry service:
//! - a target that is not refreshed within the entry timeout is dropped
//! - a target that does not exist yet is always created disabled
//!
//! It also counts calls and can simulate an unreachable registry, which is
//! what the tests rely on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::registry::TargetRegistry;
use crate::error::{Error, Result};
use crate::stream::{Target, TargetQuery, TargetStatus};

struct Entry {
    target: Target,
    refreshed_at: Instant,
}

/// Number of calls received per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCalls {
    pub register: u64,
    pub unregister: u64,
    pub get_targets: u64,
}

#[derive(Default)]
struct CallCounters {
    register: AtomicU64,
    unregister: AtomicU64,
    get_targets: AtomicU64,
}

/// Lease-based target registry kept in memory
pub struct MemoryTargetRegistry {
    entries: Mutex<Vec<Entry>>,
    entry_timeout: Duration,
    latency: Duration,
    available: AtomicBool,
    calls: CallCounters,
}

impl MemoryTargetRegistry {
    /// Create a registry expiring targets after `entry_timeout`
    pub fn new(entry_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            entry_timeout,
            latency: Duration::ZERO,
            available: AtomicBool::new(true),
            calls: CallCounters::default(),
        }
    }

    /// Delay every call by `latency` (lets concurrent clients interleave)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Get the entry timeout
    pub fn entry_timeout(&self) -> Duration {
        self.entry_timeout
    }

    /// Make every call fail with `RegistryUnavailable` until set back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of all live targets
    pub fn targets(&self) -> Vec<Target> {
        let mut entries = self.lock();
        self.expire_locked(&mut entries);
        entries.iter().map(|e| e.target.clone()).collect()
    }

    /// Drop every target, as a restarted registry would
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Get the call counters
    pub fn calls(&self) -> RegistryCalls {
        RegistryCalls {
            register: self.calls.register.load(Ordering::Relaxed),
            unregister: self.calls.unregister.load(Ordering::Relaxed),
            get_targets: self.calls.get_targets.load(Ordering::Relaxed),
        }
    }

    /// Remove targets whose lease ran out
    ///
    /// Returns the number of targets removed.
    pub fn expire(&self) -> usize {
        let mut entries = self.lock();
        self.expire_locked(&mut entries)
    }

    /// Spawn background expiry task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_expiry_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.expire();
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expire_locked(&self, entries: &mut Vec<Entry>) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|e| {
            let alive = now.duration_since(e.refreshed_at) <= self.entry_timeout;
            if !alive {
                tracing::info!(
                    stream = %e.target.stream,
                    ips = ?e.target.ips,
                    identifier = ?e.target.identifier(),
                    "Target expired"
                );
            }
            alive
        });
        before - entries.len()
    }

    async fn call(&self, counter: &AtomicU64) -> Result<()> {
        counter.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::registry("registry not reachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetRegistry for MemoryTargetRegistry {
    async fn register(&self, target: &Target) -> Result<()> {
        self.call(&self.calls.register).await?;

        let mut entries = self.lock();
        self.expire_locked(&mut entries);
        let now = Instant::now();

        let existing = entries
            .iter_mut()
            .find(|e| e.target.stream == target.stream && e.target.same_ips(&target.ips));

        match existing {
            Some(entry) => {
                entry.target = target.clone();
                entry.refreshed_at = now;
                tracing::debug!(
                    stream = %target.stream,
                    identifier = ?target.identifier(),
                    status = ?target.status,
                    "Target refreshed"
                );
            }
            None => {
                let mut created = target.clone();
                created.status = TargetStatus::Disabled;
                tracing::debug!(
                    stream = %target.stream,
                    identifier = ?target.identifier(),
                    "Target created"
                );
                entries.push(Entry {
                    target: created,
                    refreshed_at: now,
                });
            }
        }

        Ok(())
    }

    async fn unregister(&self, target: &Target) -> Result<()> {
        self.call(&self.calls.unregister).await?;

        let mut entries = self.lock();
        entries.retain(|e| !(e.target.stream == target.stream && e.target.same_ips(&target.ips)));
        Ok(())
    }

    async fn get_targets(&self, query: &TargetQuery) -> Result<Vec<Target>> {
        self.call(&self.calls.get_targets).await?;

        let mut entries = self.lock();
        self.expire_locked(&mut entries);
        Ok(entries
            .iter()
            .filter(|e| query.matches(&e.target))
            .map(|e| e.target.clone())
            .collect())
    }
}

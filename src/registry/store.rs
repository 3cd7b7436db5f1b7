//! Status registry implementation
//!
//! Holds the last known status of every stream a manager is interested in
//! and fans snapshots out to watchers.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use super::entry::{StatusEntry, StreamStatus};
use super::watcher::StatusWatcher;
use crate::stream::{filter_matches, StreamIdentity};

struct WatcherSlot {
    filter: Option<StreamIdentity>,
    tx: watch::Sender<Vec<StatusEntry>>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<StatusEntry>,
    watchers: Vec<WatcherSlot>,
}

impl Inner {
    fn position(&self, stream: &StreamIdentity) -> Option<usize> {
        self.entries.iter().position(|e| e.stream == *stream)
    }

    fn snapshot(&self, filter: Option<&StreamIdentity>) -> Vec<StatusEntry> {
        self.entries
            .iter()
            .filter(|e| filter_matches(filter, &e.stream))
            .cloned()
            .collect()
    }

    fn notify_all(&mut self) {
        // Drop watchers nobody listens to anymore
        self.watchers.retain(|w| !w.tx.is_closed());

        let entries = &self.entries;
        for watcher in &self.watchers {
            let snapshot: Vec<StatusEntry> = entries
                .iter()
                .filter(|e| filter_matches(watcher.filter.as_ref(), &e.stream))
                .cloned()
                .collect();

            watcher.tx.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }
    }
}

/// Registry of stream statuses with filtered watchers
///
/// All state sits behind a single mutex; no method awaits while holding it.
#[derive(Default)]
pub struct StatusRegistry {
    inner: Mutex<Inner>,
}

impl StatusRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stream with an initial status.
    ///
    /// Overwrites the status if the stream is already present.
    pub fn add(&self, stream: &StreamIdentity, status: StreamStatus) {
        let mut inner = self.lock();
        match inner.position(stream) {
            Some(index) => inner.entries[index].status = status,
            None => inner
                .entries
                .push(StatusEntry::new(stream.clone(), status)),
        }
        tracing::debug!(stream = %stream, status = %status, "Stream status added");
        inner.notify_all();
    }

    /// Update the status of a stream.
    ///
    /// Streams that were not added (or were removed) are left alone.
    /// Returns whether the stream was present.
    pub fn set_status(&self, stream: &StreamIdentity, status: StreamStatus) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner.position(stream) else {
            return false;
        };

        if inner.entries[index].status != status {
            tracing::debug!(
                stream = %stream,
                from = %inner.entries[index].status,
                to = %status,
                "Stream status changed"
            );
            inner.entries[index].status = status;
            inner.notify_all();
        }
        true
    }

    /// Remove a stream
    pub fn remove(&self, stream: &StreamIdentity) {
        let mut inner = self.lock();
        let Some(index) = inner.position(stream) else {
            return;
        };
        inner.entries.remove(index);
        tracing::debug!(stream = %stream, "Stream status removed");
        inner.notify_all();
    }

    /// Get the status of a stream
    pub fn get(&self, stream: &StreamIdentity) -> Option<StreamStatus> {
        let inner = self.lock();
        inner.position(stream).map(|index| inner.entries[index].status)
    }

    /// Current statuses selected by `filter` (`None` selects all)
    pub fn snapshot(&self, filter: Option<&StreamIdentity>) -> Vec<StatusEntry> {
        self.lock().snapshot(filter)
    }

    /// Watch the statuses selected by `filter` (`None` selects all).
    ///
    /// The watcher immediately yields the current snapshot.
    pub fn watch(&self, filter: Option<StreamIdentity>) -> StatusWatcher {
        let mut inner = self.lock();
        let (tx, rx) = watch::channel(inner.snapshot(filter.as_ref()));
        inner.watchers.push(WatcherSlot { filter, tx });
        StatusWatcher::new(rx)
    }

    /// Number of live watchers
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

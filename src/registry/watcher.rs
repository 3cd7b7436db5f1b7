//! Status watcher
//!
//! A watcher sees the filtered status snapshot of the registry. Updates are
//! coalesced: a snapshot that was not read yet is replaced by the next one,
//! so a slow reader only ever sees the latest state.

use tokio::sync::watch;

use super::entry::StatusEntry;

/// Subscription to the status registry
pub struct StatusWatcher {
    rx: Option<watch::Receiver<Vec<StatusEntry>>>,
    primed: bool,
}

impl StatusWatcher {
    pub(super) fn new(rx: watch::Receiver<Vec<StatusEntry>>) -> Self {
        Self {
            rx: Some(rx),
            primed: false,
        }
    }

    /// Wait for the next snapshot.
    ///
    /// The first call returns the snapshot taken when the watch started.
    /// Returns `None` once the watcher is stopped or the registry is gone.
    pub async fn recv(&mut self) -> Option<Vec<StatusEntry>> {
        let rx = self.rx.as_mut()?;

        if !self.primed {
            self.primed = true;
            return Some(rx.borrow_and_update().clone());
        }

        rx.changed().await.ok()?;
        Some(rx.borrow_and_update().clone())
    }

    /// Latest snapshot without waiting (does not mark it as read)
    pub fn latest(&self) -> Vec<StatusEntry> {
        self.rx
            .as_ref()
            .map(|rx| rx.borrow().clone())
            .unwrap_or_default()
    }

    /// Stop receiving updates
    pub fn stop(&mut self) {
        self.rx = None;
    }

    /// Check if the watcher was stopped
    pub fn is_stopped(&self) -> bool {
        self.rx.is_none()
    }
}

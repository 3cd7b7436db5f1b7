//! Stream status registry
//!
//! Publishes the externally visible status of every managed stream and lets
//! callers watch a filtered view of it.
//!
//! # Architecture
//!
//! ```text
//!   RetrySupervisor ──set_status()──┐
//!   RetrySupervisor ──set_status()──┤
//!                                   ▼
//!                     ┌──────────────────────────┐
//!                     │ StatusRegistry           │
//!                     │   entries: [StatusEntry] │
//!                     │   watchers: [filter, tx] │
//!                     └────────────┬─────────────┘
//!                                  │ filtered snapshot (latest wins)
//!              ┌───────────────────┼───────────────────┐
//!              ▼                   ▼                   ▼
//!        [StatusWatcher]     [StatusWatcher]     [StatusWatcher]
//!         filter: None        t/c1/*              t/c1/s
//! ```
//!
//! Each watcher owns a `tokio::sync::watch` channel, so an unread snapshot is
//! replaced instead of queued.

pub mod entry;
pub mod store;
pub mod watcher;

pub use entry::{StatusEntry, StreamStatus};
pub use store::StatusRegistry;
pub use watcher::StatusWatcher;

//! Stream management
//!
//! A `StreamManager` tracks the streams of one conduit. Every tracked stream
//! gets a `RetrySupervisor` that keeps its session open in the background:
//!
//! ```text
//!   configuration ──set_streams()──┐
//!   conduit events ─conduit_down()─┤
//!                                  ▼
//!                       ┌─────────────────────┐
//!                       │ StreamManager       │
//!                       │   sessions          │
//!                       │   configured        │
//!                       └──────────┬──────────┘
//!                  ┌───────────────┼───────────────┐
//!                  ▼               ▼               ▼
//!          RetrySupervisor  RetrySupervisor  RetrySupervisor
//!            (task)           (task)           (idle)
//!                  │               │
//!                  ▼               ▼
//!             StreamSession ──► TargetRegistry
//!                  │
//!                  └─ status ──► StatusRegistry
//! ```

pub mod collection;
pub mod config;
pub mod supervisor;

pub use collection::StreamManager;
pub use config::{
    ConfiguredStream, ManagerConfig, DEFAULT_ENTRY_TIMEOUT, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
};
pub use supervisor::RetrySupervisor;

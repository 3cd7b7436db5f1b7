//! Streams, targets and the per-stream session
//!
//! A workload joins a stream by registering a target that carries a small
//! integer identifier. The load balancer uses that identifier as a hashing
//! bucket key, so it has to be unique among the enabled targets of the stream.

pub mod identity;
pub mod session;
pub mod target;

pub use identity::{filter_matches, StreamIdentity};
pub use session::StreamSession;
pub use target::{Target, TargetQuery, TargetStatus, IDENTIFIER_KEY};

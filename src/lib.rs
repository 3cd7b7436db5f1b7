//! Target identifier allocation and registration
//!
//! Workloads attached to a traffic-steering conduit join streams by
//! registering targets in a shared, lease-based registry. Each target
//! carries a small integer identifier that the load balancer uses as a
//! hashing bucket key, so the identifiers of a stream's enabled targets must
//! never collide. There is no central allocator: every workload picks an
//! identifier, registers it disabled, checks for collisions and only then
//! enables it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use target_registrar::client::{MemoryTargetRegistry, StaticConduit};
//! use target_registrar::manager::{ConfiguredStream, ManagerConfig, StreamManager};
//! use target_registrar::registry::StatusRegistry;
//! use target_registrar::stream::StreamIdentity;
//!
//! # async fn example() {
//! let registry = Arc::new(MemoryTargetRegistry::new(Duration::from_secs(60)));
//! let conduit = Arc::new(StaticConduit::new(["172.16.0.2/24"]));
//! let statuses = Arc::new(StatusRegistry::new());
//!
//! let manager = StreamManager::new(ManagerConfig::default(), registry, conduit, statuses.clone());
//! let stream = StreamIdentity::new("trench-a", "conduit-a", "stream-a");
//!
//! manager.set_streams(vec![ConfiguredStream::new(stream.clone(), 100)]).await;
//! manager.run().await;
//! manager.add_stream(stream).await;
//!
//! let mut watcher = statuses.watch(None);
//! while let Some(entries) = watcher.recv().await {
//!     println!("{:?}", entries);
//! }
//! # }
//! ```

pub mod client;
pub mod error;
pub mod manager;
pub mod registry;
pub mod retry;
pub mod stream;

pub use error::{Error, Result};
pub use manager::{ConfiguredStream, ManagerConfig, StreamManager};
pub use registry::{StatusRegistry, StreamStatus};
pub use stream::{StreamIdentity, StreamSession};

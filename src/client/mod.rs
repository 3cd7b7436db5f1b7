//! External collaborators
//!
//! The registration core talks to two things it does not own:
//! - the target registry, which stores targets with lease-based expiry
//! - the conduit, which supplies the local addresses to register
//!
//! Both are traits so the real RPC client and transport can be plugged in.
//! `MemoryTargetRegistry` and `StaticConduit` are local implementations.

pub mod conduit;
pub mod memory;
pub mod registry;

pub use conduit::{Conduit, StaticConduit};
pub use memory::{MemoryTargetRegistry, RegistryCalls};
pub use registry::TargetRegistry;

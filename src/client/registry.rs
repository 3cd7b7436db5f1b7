//! Target registry client interface

use async_trait::async_trait;

use crate::error::Result;
use crate::stream::{Target, TargetQuery};

/// Client side of the target registry service
///
/// Implementations map any transport failure to
/// [`Error::RegistryUnavailable`](crate::Error::RegistryUnavailable).
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// Create or refresh a target.
    ///
    /// Refreshing extends the target's lease. A target that does not exist
    /// yet is always created with the disabled status.
    async fn register(&self, target: &Target) -> Result<()>;

    /// Remove a target (matched by stream and addresses)
    async fn unregister(&self, target: &Target) -> Result<()>;

    /// Point-in-time list of the targets selected by `query`
    async fn get_targets(&self, query: &TargetQuery) -> Result<Vec<Target>>;
}

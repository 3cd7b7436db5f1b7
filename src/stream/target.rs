//! Target types
//!
//! A target is what gets registered with the target registry: the set of
//! local addresses of a workload together with the identifier it claimed in
//! a stream.

use std::collections::{BTreeSet, HashMap};

use super::identity::StreamIdentity;

/// Context key carrying the target identifier
pub const IDENTIFIER_KEY: &str = "identifier";

/// Registration status of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetStatus {
    /// Registered but not receiving traffic
    Disabled,
    /// Registered and eligible for traffic
    Enabled,
    /// Query wildcard (matches both)
    Any,
}

impl TargetStatus {
    /// Check whether `status` is selected by this status used in a query
    pub fn matches(self, status: TargetStatus) -> bool {
        self == TargetStatus::Any || status == TargetStatus::Any || self == status
    }
}

/// A target as stored in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Local addresses in CIDR notation
    pub ips: Vec<String>,
    /// Free-form context (carries the identifier)
    pub context: HashMap<String, String>,
    /// Registration status
    pub status: TargetStatus,
    /// Stream the target belongs to
    pub stream: StreamIdentity,
}

impl Target {
    /// Create a target without identifier
    pub fn new(stream: StreamIdentity, ips: Vec<String>, status: TargetStatus) -> Self {
        Self {
            ips,
            context: HashMap::new(),
            status,
            stream,
        }
    }

    /// Set the identifier carried in the context
    pub fn with_identifier(mut self, identifier: u32) -> Self {
        self.context
            .insert(IDENTIFIER_KEY.to_string(), identifier.to_string());
        self
    }

    /// Get the identifier string, if any
    pub fn identifier(&self) -> Option<&str> {
        self.context.get(IDENTIFIER_KEY).map(String::as_str)
    }

    /// Compare the address sets, ignoring order and duplicates
    pub fn same_ips(&self, ips: &[String]) -> bool {
        same_ip_set(&self.ips, ips)
    }
}

/// Compare two address lists as sets
pub fn same_ip_set(a: &[String], b: &[String]) -> bool {
    ip_set(a) == ip_set(b)
}

fn ip_set(ips: &[String]) -> BTreeSet<&str> {
    ips.iter().map(String::as_str).collect()
}

/// Selection of targets for `TargetRegistry::get_targets`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetQuery {
    /// Stream filter (empty names are wildcards)
    pub stream: StreamIdentity,
    /// Status filter
    pub status: TargetStatus,
}

impl TargetQuery {
    /// Query all targets of a stream whatever their status
    pub fn stream(stream: StreamIdentity) -> Self {
        Self {
            stream,
            status: TargetStatus::Any,
        }
    }

    /// Check whether a target is selected by this query
    pub fn matches(&self, target: &Target) -> bool {
        self.status.matches(target.status) && self.stream.matches(&target.stream)
    }
}

//! Stream identity
//!
//! Streams are named hierarchically as trench, conduit and stream. The same
//! type is used as a filter, in which case an empty name matches any value
//! at that level.

/// Unique identifier for a stream (trench + conduit + stream name)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamIdentity {
    /// Trench name (e.g., "trench-a")
    pub trench: String,
    /// Conduit name within the trench
    pub conduit: String,
    /// Stream name within the conduit
    pub stream: String,
}

impl StreamIdentity {
    /// Create a new stream identity
    pub fn new(
        trench: impl Into<String>,
        conduit: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        Self {
            trench: trench.into(),
            conduit: conduit.into(),
            stream: stream.into(),
        }
    }

    /// Filter matching every stream of a conduit
    pub fn conduit_filter(trench: impl Into<String>, conduit: impl Into<String>) -> Self {
        Self::new(trench, conduit, "")
    }

    /// Filter matching every stream of a trench
    pub fn trench_filter(trench: impl Into<String>) -> Self {
        Self::new(trench, "", "")
    }

    /// Whether all three levels are named
    pub fn is_complete(&self) -> bool {
        !self.trench.is_empty() && !self.conduit.is_empty() && !self.stream.is_empty()
    }

    /// `trench/conduit/stream`
    pub fn full_name(&self) -> String {
        self.to_string()
    }

    /// Check whether `other` is selected by this identity used as a filter.
    ///
    /// Empty names are wildcards. A level only matches if every level above
    /// it matches too.
    pub fn matches(&self, other: &StreamIdentity) -> bool {
        let trench = level_matches(&self.trench, &other.trench);
        let conduit = trench && level_matches(&self.conduit, &other.conduit);
        conduit && level_matches(&self.stream, &other.stream)
    }
}

fn level_matches(filter: &str, value: &str) -> bool {
    filter.is_empty() || filter == value
}

/// Apply an optional filter; `None` selects everything.
pub fn filter_matches(filter: Option<&StreamIdentity>, identity: &StreamIdentity) -> bool {
    filter.map_or(true, |f| f.matches(identity))
}

impl std::fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.trench, self.conduit, self.stream)
    }
}

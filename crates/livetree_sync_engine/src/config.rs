//! Configuration for the sync tree.

/// Tuning knobs for a [`SyncTree`](crate::SyncTree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTreeConfig {
    /// First tag handed to a constrained query.
    pub first_tag: u64,
    /// A limit filter rebuilds its window from the anchor when the incoming
    /// node has more than `limit_rebuild_factor * limit` children, and
    /// deletes out-of-window children otherwise.
    pub limit_rebuild_factor: usize,
}

impl SyncTreeConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            first_tag: 1,
            limit_rebuild_factor: 2,
        }
    }

    /// Sets the first query tag.
    pub fn with_first_tag(mut self, tag: u64) -> Self {
        self.first_tag = tag;
        self
    }

    /// Sets the limit rebuild factor.
    pub fn with_limit_rebuild_factor(mut self, factor: usize) -> Self {
        self.limit_rebuild_factor = factor;
        self
    }
}

impl Default for SyncTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

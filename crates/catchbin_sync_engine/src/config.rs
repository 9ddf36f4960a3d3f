//! Configuration for the sync engine.

/// How push `create` events are placed in the request list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushOrdering {
    /// Insert at the position matching `captured_at`, newest first.
    ///
    /// In-order delivery degenerates to a prepend.
    #[default]
    InsertSorted,
    /// Prepend every created request, trusting the channel's order.
    TrustChannel,
}

/// Configuration for a [`crate::SyncEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fetch the payload of requests announced by push `create` events.
    pub resolve_payloads: bool,
    /// Placement of pushed requests.
    pub push_ordering: PushOrdering,
    /// Prune sessions the server no longer knows during [`crate::SyncEngine::load`].
    pub reconcile_on_start: bool,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            resolve_payloads: true,
            push_ordering: PushOrdering::InsertSorted,
            reconcile_on_start: true,
        }
    }

    /// Enables or disables payload resolution after push `create` events.
    pub fn with_resolve_payloads(mut self, resolve: bool) -> Self {
        self.resolve_payloads = resolve;
        self
    }

    /// Sets the push ordering policy.
    pub fn with_push_ordering(mut self, ordering: PushOrdering) -> Self {
        self.push_ordering = ordering;
        self
    }

    /// Enables or disables startup reconciliation.
    pub fn with_reconcile_on_start(mut self, reconcile: bool) -> Self {
        self.reconcile_on_start = reconcile;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = EngineConfig::default();
        assert!(config.resolve_payloads);
        assert!(config.reconcile_on_start);
        assert_eq!(config.push_ordering, PushOrdering::InsertSorted);
    }

    #[test]
    fn config_builder() {
        let config = EngineConfig::new()
            .with_resolve_payloads(false)
            .with_push_ordering(PushOrdering::TrustChannel)
            .with_reconcile_on_start(false);
        assert!(!config.resolve_payloads);
        assert!(!config.reconcile_on_start);
        assert_eq!(config.push_ordering, PushOrdering::TrustChannel);
    }
}

//! Property-based testing strategies using proptest.

use proptest::prelude::*;

/// Shape of an action-filter chain for ordering properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainScenario {
    /// Number of action filters
    pub filters: usize,
    /// Index of the filter whose pre-hook short-circuits, if any
    pub short_circuit_at: Option<usize>,
    /// Index of the filter whose post-hook handles the action's fault, if any
    pub handle_at: Option<usize>,
    /// Whether the action itself faults
    pub action_faults: bool,
}

impl ChainScenario {
    /// Number of filters whose pre-hook runs.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.short_circuit_at.map_or(self.filters, |k| k + 1)
    }

    /// Whether the action method runs.
    #[must_use]
    pub const fn action_runs(&self) -> bool {
        self.short_circuit_at.is_none()
    }
}

/// Chains of `1..=max_filters` filters, each scenario at most one short-circuit
/// and at most one handler.
pub fn chain_scenario(max_filters: usize) -> impl Strategy<Value = ChainScenario> {
    (1..=max_filters.max(1)).prop_flat_map(|filters| {
        (
            Just(filters),
            proptest::option::of(0..filters),
            proptest::option::of(0..filters),
            any::<bool>(),
        )
            .prop_map(|(filters, short_circuit_at, handle_at, action_faults)| ChainScenario {
                filters,
                short_circuit_at,
                handle_at,
                action_faults,
            })
    })
}

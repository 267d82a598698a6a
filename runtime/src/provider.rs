//! Scoped filter registry.
//!
//! Filters are registered globally, per controller or per action. The filters
//! for one invocation are composed in fixed scope order (global, then
//! controller, then action), keeping registration order inside each scope.

use actionflow_core::{ActionDescriptor, FilterProvider, FilterSet, RequestContext};
use std::collections::HashMap;

/// Default [`FilterProvider`] composing filters from three scopes.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    global: FilterSet,
    controllers: HashMap<String, FilterSet>,
    actions: HashMap<(String, String), FilterSet>,
}

impl FilterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add filters that apply to every action.
    #[must_use]
    pub fn with_global(mut self, filters: FilterSet) -> Self {
        self.global.extend(filters);
        self
    }

    /// Add filters that apply to every action of one controller.
    #[must_use]
    pub fn with_controller(mut self, controller: &str, filters: FilterSet) -> Self {
        self.controllers
            .entry(controller.to_ascii_lowercase())
            .or_default()
            .extend(filters);
        self
    }

    /// Add filters that apply to one action.
    #[must_use]
    pub fn with_action(mut self, controller: &str, action: &str, filters: FilterSet) -> Self {
        self.actions
            .entry((controller.to_ascii_lowercase(), action.to_ascii_lowercase()))
            .or_default()
            .extend(filters);
        self
    }
}

impl FilterProvider for FilterRegistry {
    fn get_filters(&self, _request: &RequestContext, action: &ActionDescriptor) -> FilterSet {
        let controller = action.controller_name().to_ascii_lowercase();
        let mut filters = self.global.clone();

        if let Some(scoped) = self.controllers.get(&controller) {
            filters.extend(scoped.clone());
        }
        if let Some(scoped) = self
            .actions
            .get(&(controller, action.name().to_ascii_lowercase()))
        {
            filters.extend(scoped.clone());
        }

        filters
    }
}

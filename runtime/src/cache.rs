//! Controller descriptor cache.
//!
//! Owned by the process and passed by reference to whatever resolves
//! descriptors. Keyed by controller type; populated once per type and never
//! evicted.

use actionflow_core::{ActionError, ControllerDescriptor};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Append-only map from controller type to its descriptor.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    descriptors: RwLock<HashMap<TypeId, Arc<ControllerDescriptor>>>,
}

impl DescriptorCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptor for `controller_type`, if any.
    #[must_use]
    pub fn get(&self, controller_type: TypeId) -> Option<Arc<ControllerDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&controller_type)
            .cloned()
    }

    /// Cached descriptor for `controller_type`, building it on first use.
    ///
    /// `build` runs outside the lock, so two racing callers may both build;
    /// the first to store wins and both receive the stored descriptor.
    ///
    /// # Errors
    ///
    /// Returns whatever `build` fails with; nothing is cached in that case.
    pub fn get_or_try_insert(
        &self,
        controller_type: TypeId,
        build: impl FnOnce() -> Result<ControllerDescriptor, ActionError>,
    ) -> Result<Arc<ControllerDescriptor>, ActionError> {
        if let Some(descriptor) = self.get(controller_type) {
            return Ok(descriptor);
        }

        let built = Arc::new(build()?);
        tracing::trace!(controller = built.name(), "Caching controller descriptor");
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(descriptors.entry(controller_type).or_insert(built)))
    }

    /// Number of cached descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

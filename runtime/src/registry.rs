//! In-memory controller registry.
//!
//! Controllers are registered by name with a constructor and a function that
//! declares their actions. The registry serves as both the
//! [`ControllerFactory`] and the [`DescriptorProvider`] of an invoker.
//!
//! # Example
//!
//! ```
//! use actionflow_core::{ActionDescriptor, ActionError, ControllerFactory, RequestContext};
//! use actionflow_runtime::registry::ControllerRegistry;
//!
//! struct Home;
//!
//! # fn main() -> Result<(), ActionError> {
//! let mut registry = ControllerRegistry::default();
//! registry.register("home", || Home, |controller| {
//!     controller.action(ActionDescriptor::builder("index").sync(|_: &Home, _| Ok("welcome")))
//! })?;
//!
//! let controller = registry.create_controller(&RequestContext::new("HOME"))?;
//! registry.release_controller(controller);
//! # Ok(())
//! # }
//! ```

use crate::cache::DescriptorCache;
use actionflow_core::descriptor::ControllerDescriptorBuilder;
use actionflow_core::{
    ActionError, ControllerDescriptor, ControllerFactory, ControllerInstance, DescriptorProvider,
    RequestContext,
};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Constructor = Arc<dyn Fn() -> ControllerInstance + Send + Sync>;
type Describe = Arc<dyn Fn() -> Result<ControllerDescriptor, ActionError> + Send + Sync>;

struct Registration {
    name: String,
    construct: Constructor,
    describe: Describe,
}

/// Controllers known to the host, by case-insensitive name.
pub struct ControllerRegistry {
    by_name: HashMap<String, Arc<Registration>>,
    by_type: HashMap<TypeId, Arc<Registration>>,
    cache: Arc<DescriptorCache>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.by_name.values().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("ControllerRegistry")
            .field("controllers", &names)
            .field("cached_descriptors", &self.cache.len())
            .finish()
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(DescriptorCache::new()))
    }
}

impl ControllerRegistry {
    /// Create a registry backed by `cache`.
    #[must_use]
    pub fn new(cache: Arc<DescriptorCache>) -> Self {
        Self {
            by_name: HashMap::new(),
            by_type: HashMap::new(),
            cache,
        }
    }

    /// The descriptor cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<DescriptorCache> {
        &self.cache
    }

    /// Register controller type `C` under `name`.
    ///
    /// `construct` creates one instance per request. `describe` declares the
    /// actions; it runs once, when the descriptor is first needed.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidDescriptor`] if the name or the type is
    /// already registered.
    pub fn register<C, F, D>(
        &mut self,
        name: impl Into<String>,
        construct: F,
        describe: D,
    ) -> Result<(), ActionError>
    where
        C: Any + Send + Sync,
        F: Fn() -> C + Send + Sync + 'static,
        D: Fn(ControllerDescriptorBuilder) -> ControllerDescriptorBuilder + Send + Sync + 'static,
    {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        if self.by_name.contains_key(&key) {
            return Err(ActionError::InvalidDescriptor(format!(
                "controller `{name}` is already registered"
            )));
        }
        if self.by_type.contains_key(&TypeId::of::<C>()) {
            return Err(ActionError::InvalidDescriptor(format!(
                "controller type `{}` is already registered",
                std::any::type_name::<C>()
            )));
        }

        let descriptor_name = name.clone();
        let registration = Arc::new(Registration {
            name,
            construct: Arc::new(move || Arc::new(construct()) as ControllerInstance),
            describe: Arc::new(move || {
                describe(ControllerDescriptor::builder::<C>(descriptor_name.as_str())).build()
            }),
        });

        self.by_name.insert(key, Arc::clone(&registration));
        self.by_type.insert(TypeId::of::<C>(), registration);
        Ok(())
    }

    /// Registered controller names, sorted.
    #[must_use]
    pub fn controller_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.by_name.values().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl ControllerFactory for ControllerRegistry {
    fn create_controller(&self, request: &RequestContext) -> Result<ControllerInstance, ActionError> {
        let name = request.controller_name();
        let registration = self
            .by_name
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| ActionError::ControllerNotFound(name.to_string()))?;

        tracing::trace!(controller = %registration.name, "Creating controller");
        Ok((registration.construct)())
    }

    fn release_controller(&self, controller: ControllerInstance) {
        tracing::trace!("Releasing controller");
        drop(controller);
    }
}

impl DescriptorProvider for ControllerRegistry {
    fn controller_descriptor(
        &self,
        _request: &RequestContext,
        controller: &ControllerInstance,
    ) -> Result<Arc<ControllerDescriptor>, ActionError> {
        let controller_type = Any::type_id(&**controller);
        let registration = self.by_type.get(&controller_type).ok_or_else(|| {
            ActionError::InvalidDescriptor("controller instance has no registered type".to_string())
        })?;

        self.cache
            .get_or_try_insert(controller_type, || (registration.describe)())
    }
}

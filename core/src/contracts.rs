//! Collaborators the pipeline consumes.
//!
//! Route matching, controller construction, filter lookup, parameter binding,
//! request validation and result rendering all live outside the pipeline. The
//! orchestrator reaches them only through these traits, so a host can swap
//! any of them without touching the invocation logic. `actionflow-runtime`
//! ships in-memory defaults for most of them.

use crate::arguments::Parameters;
use crate::descriptor::{ActionDescriptor, ControllerDescriptor, ControllerInstance};
use crate::error::ActionError;
use crate::filter::FilterSet;
use crate::request::RequestContext;
use crate::result::ActionResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Creates and releases controller instances.
///
/// The orchestrator calls [`release_controller`](Self::release_controller)
/// exactly once for every controller it created, whatever the outcome.
pub trait ControllerFactory: Send + Sync {
    /// Create the controller the request is addressed to.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::ControllerNotFound`] if no controller answers to
    /// the request's controller name.
    fn create_controller(&self, request: &RequestContext) -> Result<ControllerInstance, ActionError>;

    /// Release a controller previously returned by `create_controller`.
    fn release_controller(&self, controller: ControllerInstance);
}

/// Resolves descriptors for live controllers.
pub trait DescriptorProvider: Send + Sync {
    /// Descriptor of the given controller instance.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidDescriptor`] if the controller's type has
    /// no valid descriptor.
    fn controller_descriptor(
        &self,
        request: &RequestContext,
        controller: &ControllerInstance,
    ) -> Result<Arc<ControllerDescriptor>, ActionError>;

    /// Find the action a request names. `None` means "not found".
    fn find_action(
        &self,
        _request: &RequestContext,
        controller: &ControllerDescriptor,
        action_name: &str,
    ) -> Option<Arc<ActionDescriptor>> {
        controller.find_action(action_name)
    }
}

/// Supplies the filters that apply to an action.
pub trait FilterProvider: Send + Sync {
    /// Filters for one invocation, in the order they must run.
    fn get_filters(&self, request: &RequestContext, action: &ActionDescriptor) -> FilterSet;
}

/// Produces the parameter mapping for an action from the request.
pub trait ParameterBinder: Send + Sync {
    /// Bind every declared value parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Binding`] if a required parameter cannot be satisfied.
    fn bind_parameters(
        &self,
        request: &RequestContext,
        action: &ActionDescriptor,
    ) -> Result<Parameters, ActionError>;
}

/// Validates a request before parameters are bound.
pub trait RequestValidator: Send + Sync {
    /// Accept or reject the request.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] (or any other fault) to reject it.
    fn validate(&self, request: &RequestContext) -> Result<(), ActionError>;
}

/// Performs the side effects an [`ActionResult`] describes.
#[async_trait]
pub trait ResultExecutor: Send + Sync {
    /// Execute `result` for the request.
    ///
    /// # Errors
    ///
    /// Any fault raised while producing the response.
    async fn execute(
        &self,
        request: &RequestContext,
        action: &ActionDescriptor,
        result: &ActionResult,
    ) -> Result<(), ActionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Home;

    struct StaticDescriptors(Arc<ControllerDescriptor>);

    impl DescriptorProvider for StaticDescriptors {
        fn controller_descriptor(
            &self,
            _request: &RequestContext,
            _controller: &ControllerInstance,
        ) -> Result<Arc<ControllerDescriptor>, ActionError> {
            Ok(Arc::clone(&self.0))
        }
    }

    #[test]
    fn default_find_action_ignores_case() {
        let descriptor = ControllerDescriptor::builder::<Home>("home")
            .action(ActionDescriptor::builder("Index").sync(|_: &Home, _| Ok(())))
            .build();
        let Ok(descriptor) = descriptor else {
            unreachable!("descriptor is valid");
        };
        let provider = StaticDescriptors(Arc::new(descriptor));
        let request = RequestContext::new("home");

        let found = provider.find_action(&request, &provider.0, "index");
        assert_eq!(found.map(|a| a.name().to_string()), Some("Index".to_string()));
        assert!(provider.find_action(&request, &provider.0, "missing").is_none());
    }
}

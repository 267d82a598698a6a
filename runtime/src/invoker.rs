//! Pipeline orchestrator.
//!
//! [`ActionInvoker::invoke_action`] is the entry point for one request. The
//! stages, in order:
//!
//! 1. create the controller and resolve the action (`Ok(false)` if unknown)
//! 2. authentication filters; a short-circuit executes its result
//! 3. authorization filters; likewise
//! 4. request validation, if enabled
//! 5. parameter binding
//! 6. the action filter chain around the action
//! 7. the result filter chain around the winning result
//!
//! Whenever a result is about to be executed after stages 2, 3 or 6, every
//! authentication filter is first asked for a challenge; a non-empty
//! challenge result replaces the original one. Faults escaping stages 2-7 go
//! to the exception filters, except a host abort, which is re-raised
//! untouched. The controller is released exactly once on every path.

use crate::binding::RouteValueBinder;
use crate::chain::{ActionChain, ResultChain};
use crate::config::PipelineConfig;
use crate::executor::ActionExecutor;
use crate::extractor::ExtractorRegistry;
use crate::interop::{self, TaskAsyncResult};
use crate::metrics::{InvocationMetrics, ShortCircuitStage};
use crate::registry::ControllerRegistry;
use actionflow_core::pending::{AsyncCallback, AsyncResult, AsyncState};
use actionflow_core::{
    ActionDescriptor, ActionError, ActionResult, AuthenticationChallengeContext,
    AuthenticationContext, AuthorizationContext, ControllerDescriptor, ControllerFactory,
    ControllerInstance, DescriptorProvider, ExceptionContext, FilterProvider, FilterSet,
    ParameterBinder, PendingComputation, RequestContext, RequestValidator, ResultExecutor,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Releases a controller when dropped.
///
/// Held for the whole invocation, so release happens exactly once whether the
/// invocation succeeds, faults or is dropped mid-flight.
pub struct ControllerLease {
    factory: Arc<dyn ControllerFactory>,
    controller: ControllerInstance,
}

impl ControllerLease {
    /// Take ownership of `controller` until the lease drops.
    #[must_use]
    pub fn new(factory: Arc<dyn ControllerFactory>, controller: ControllerInstance) -> Self {
        Self {
            factory,
            controller,
        }
    }

    /// The leased controller.
    #[must_use]
    pub const fn controller(&self) -> &ControllerInstance {
        &self.controller
    }
}

impl Drop for ControllerLease {
    fn drop(&mut self) {
        self.factory
            .release_controller(Arc::clone(&self.controller));
    }
}

impl fmt::Debug for ControllerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerLease").finish_non_exhaustive()
    }
}

/// Invokes controller actions through the filter pipeline.
///
/// # Example
///
/// ```no_run
/// use actionflow_core::{async_trait, ActionDescriptor, ActionError, ActionResult};
/// use actionflow_core::{RequestContext, ResultExecutor};
/// use actionflow_runtime::{ActionInvoker, ControllerRegistry};
/// use std::sync::Arc;
///
/// struct Home;
/// struct Discard;
///
/// #[async_trait]
/// impl ResultExecutor for Discard {
///     async fn execute(
///         &self,
///         _request: &RequestContext,
///         _action: &ActionDescriptor,
///         _result: &ActionResult,
///     ) -> Result<(), ActionError> {
///         Ok(())
///     }
/// }
///
/// # async fn example() -> Result<(), ActionError> {
/// let mut registry = ControllerRegistry::default();
/// registry.register("home", || Home, |c| {
///     c.action(ActionDescriptor::builder("index").sync(|_: &Home, _| Ok("welcome")))
/// })?;
///
/// let invoker = ActionInvoker::from_registry(Arc::new(registry), Arc::new(Discard)).build();
/// let found = invoker.invoke_action(Arc::new(RequestContext::new("home")), "index").await?;
/// assert!(found);
/// # Ok(())
/// # }
/// ```
pub struct ActionInvoker {
    config: PipelineConfig,
    controllers: Arc<dyn ControllerFactory>,
    descriptors: Arc<dyn DescriptorProvider>,
    filters: Arc<dyn FilterProvider>,
    binder: Arc<dyn ParameterBinder>,
    validator: Option<Arc<dyn RequestValidator>>,
    chain: ActionChain,
    results: ResultChain,
}

impl fmt::Debug for ActionInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionInvoker")
            .field("config", &self.config)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ActionInvoker`].
pub struct ActionInvokerBuilder {
    config: PipelineConfig,
    controllers: Arc<dyn ControllerFactory>,
    descriptors: Arc<dyn DescriptorProvider>,
    results: Arc<dyn ResultExecutor>,
    filters: Arc<dyn FilterProvider>,
    binder: Arc<dyn ParameterBinder>,
    validator: Option<Arc<dyn RequestValidator>>,
    extractors: Arc<ExtractorRegistry>,
}

impl fmt::Debug for ActionInvokerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionInvokerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ActionInvokerBuilder {
    /// Set the configuration
    #[must_use]
    pub const fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the filter provider (no filters by default)
    #[must_use]
    pub fn with_filters(mut self, filters: Arc<dyn FilterProvider>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the parameter binder ([`RouteValueBinder`] by default)
    #[must_use]
    pub fn with_binder(mut self, binder: Arc<dyn ParameterBinder>) -> Self {
        self.binder = binder;
        self
    }

    /// Set the request validator (none by default)
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn RequestValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Share an extraction registry with other invokers
    #[must_use]
    pub fn with_extractors(mut self, extractors: Arc<ExtractorRegistry>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Build the invoker.
    #[must_use]
    pub fn build(self) -> ActionInvoker {
        let executor = ActionExecutor::new(self.extractors, self.config.async_timeout);
        ActionInvoker {
            config: self.config,
            controllers: self.controllers,
            descriptors: self.descriptors,
            filters: self.filters,
            binder: self.binder,
            validator: self.validator,
            chain: ActionChain::new(executor),
            results: ResultChain::new(self.results),
        }
    }
}

impl ActionInvoker {
    /// Start building an invoker from its required collaborators.
    #[must_use]
    pub fn builder(
        controllers: Arc<dyn ControllerFactory>,
        descriptors: Arc<dyn DescriptorProvider>,
        results: Arc<dyn ResultExecutor>,
    ) -> ActionInvokerBuilder {
        ActionInvokerBuilder {
            config: PipelineConfig::default(),
            controllers,
            descriptors,
            results,
            filters: Arc::new(FilterSet::new()),
            binder: Arc::new(RouteValueBinder),
            validator: None,
            extractors: Arc::new(ExtractorRegistry::new()),
        }
    }

    /// Start building an invoker whose controllers come from `registry`.
    #[must_use]
    pub fn from_registry(
        registry: Arc<ControllerRegistry>,
        results: Arc<dyn ResultExecutor>,
    ) -> ActionInvokerBuilder {
        Self::builder(Arc::clone(&registry) as Arc<dyn ControllerFactory>, registry, results)
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Invoke the named action for `request`.
    ///
    /// Returns `Ok(false)` if the controller has no such action; otherwise a
    /// result was executed and `Ok(true)` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::ControllerNotFound`] if no controller answers to
    /// the request, any fault no exception filter handled, or a host abort.
    #[tracing::instrument(
        skip_all,
        name = "invoke_action",
        fields(
            controller = request.controller_name(),
            action = action_name,
            request_id = %request.request_id(),
        )
    )]
    pub async fn invoke_action(
        &self,
        request: Arc<RequestContext>,
        action_name: &str,
    ) -> Result<bool, ActionError> {
        let started = Instant::now();
        let controller = self.controllers.create_controller(&request)?;
        let lease = ControllerLease::new(Arc::clone(&self.controllers), controller);

        let controller_descriptor = self
            .descriptors
            .controller_descriptor(&request, lease.controller())?;
        let Some(action) = self
            .descriptors
            .find_action(&request, &controller_descriptor, action_name)
        else {
            tracing::debug!("No matching action");
            InvocationMetrics::record_not_found();
            return Ok(false);
        };

        InvocationMetrics::record_invoked();
        let filters = self.filters.get_filters(&request, &action);

        let outcome = match self
            .run_stages(&request, &controller_descriptor, &action, lease.controller(), &filters)
            .await
        {
            Err(error) if !error.is_host_abort() => {
                self.handle_exception(&request, &action, &filters, error)
                    .await
            }
            outcome => outcome,
        };

        if let Err(error) = &outcome {
            tracing::warn!(error = %error, kind = error.kind(), "Action invocation failed");
        }
        outcome?;

        InvocationMetrics::record_duration(started.elapsed());
        Ok(true)
    }

    /// Stages 2-7.
    async fn run_stages(
        &self,
        request: &Arc<RequestContext>,
        controller_descriptor: &ControllerDescriptor,
        action: &Arc<ActionDescriptor>,
        controller: &ControllerInstance,
        filters: &FilterSet,
    ) -> Result<(), ActionError> {
        if let Some(result) = authenticate(request, action, filters).await? {
            tracing::debug!("Authentication short-circuited");
            InvocationMetrics::record_short_circuit(ShortCircuitStage::Authentication);
            let result = challenge(request, action, filters, result).await?;
            return self.results.execute(request, action, &result).await;
        }

        if let Some(result) = authorize(request, action, filters).await? {
            tracing::debug!("Authorization short-circuited");
            InvocationMetrics::record_short_circuit(ShortCircuitStage::Authorization);
            let result = challenge(request, action, filters, result).await?;
            return self.results.execute(request, action, &result).await;
        }

        if self.config.validate_requests && controller_descriptor.validate_request() {
            if let Some(validator) = &self.validator {
                validator.validate(request)?;
            }
        }

        let parameters = self.binder.bind_parameters(request, action)?;
        let executed = self
            .chain
            .run(request, action, Arc::clone(controller), &filters.action, parameters)
            .await?;
        tracing::debug!(canceled = executed.canceled, "Action chain completed");

        let result = executed.result.unwrap_or(ActionResult::Empty);
        let result = challenge(request, action, filters, result).await?;
        self.results
            .run(request, action, &filters.result, result)
            .await
    }

    /// Offer `error` to every exception filter, in order.
    async fn handle_exception(
        &self,
        request: &Arc<RequestContext>,
        action: &Arc<ActionDescriptor>,
        filters: &FilterSet,
        error: ActionError,
    ) -> Result<(), ActionError> {
        let mut context = ExceptionContext::new(Arc::clone(request), Arc::clone(action), error);
        for (index, filter) in filters.exception.iter().enumerate() {
            tracing::trace!(filter = index, "Running exception filter");
            filter.on_exception(&mut context).await?;
        }

        InvocationMetrics::record_fault(context.exception_handled);
        if !context.exception_handled {
            return Err(context.into_exception());
        }

        tracing::debug!(error = %context.exception(), "Exception filter handled the fault");
        let result = context.result.take().unwrap_or(ActionResult::Empty);
        self.results.execute(request, action, &result).await
    }

    /// Start an invocation for a begin/end caller.
    ///
    /// The invocation runs on the current tokio runtime; `callback` runs once
    /// it completes (before this returns, if it already has).
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn begin_invoke_action(
        self: &Arc<Self>,
        request: Arc<RequestContext>,
        action_name: impl Into<String>,
        callback: Option<AsyncCallback>,
        state: Option<AsyncState>,
    ) -> Arc<TaskAsyncResult<bool>> {
        let invoker = Arc::clone(self);
        let action_name = action_name.into();
        let computation = PendingComputation::spawn(async move {
            invoker.invoke_action(request, &action_name).await
        });
        interop::begin(computation, callback, state)
    }

    /// Finish an invocation started by [`begin_invoke_action`](Self::begin_invoke_action).
    ///
    /// Blocks the calling thread; must not be called from inside an async task.
    ///
    /// # Errors
    ///
    /// The same faults [`invoke_action`](Self::invoke_action) returns.
    pub fn end_invoke_action(handle: Arc<dyn AsyncResult>) -> Result<bool, ActionError> {
        interop::end(handle)
    }
}

/// Run authentication filters until one supplies a result.
///
/// A replaced principal is applied to the request either way.
async fn authenticate(
    request: &Arc<RequestContext>,
    action: &Arc<ActionDescriptor>,
    filters: &FilterSet,
) -> Result<Option<ActionResult>, ActionError> {
    let original = request.principal();
    let mut context = AuthenticationContext {
        request: Arc::clone(request),
        descriptor: Arc::clone(action),
        principal: original.clone(),
        result: None,
    };

    for (index, filter) in filters.authentication.iter().enumerate() {
        tracing::trace!(filter = index, "Running authentication filter");
        filter.on_authentication(&mut context).await?;
        if context.result.is_some() {
            break;
        }
    }

    if context.principal != original {
        request.set_principal(context.principal);
    }
    Ok(context.result)
}

/// Run authorization filters until one supplies a result.
async fn authorize(
    request: &Arc<RequestContext>,
    action: &Arc<ActionDescriptor>,
    filters: &FilterSet,
) -> Result<Option<ActionResult>, ActionError> {
    let mut context = AuthorizationContext {
        request: Arc::clone(request),
        descriptor: Arc::clone(action),
        result: None,
    };

    for (index, filter) in filters.authorization.iter().enumerate() {
        tracing::trace!(filter = index, "Running authorization filter");
        filter.on_authorization(&mut context).await?;
        if context.result.is_some() {
            break;
        }
    }
    Ok(context.result)
}

/// Ask every authentication filter to contribute to `result`.
async fn challenge(
    request: &Arc<RequestContext>,
    action: &Arc<ActionDescriptor>,
    filters: &FilterSet,
    result: ActionResult,
) -> Result<ActionResult, ActionError> {
    if filters.authentication.is_empty() {
        return Ok(result);
    }

    let mut context = AuthenticationChallengeContext {
        request: Arc::clone(request),
        descriptor: Arc::clone(action),
        result: Some(result.clone()),
    };
    for (index, filter) in filters.authentication.iter().enumerate() {
        tracing::trace!(filter = index, "Running authentication challenge");
        filter.on_authentication_challenge(&mut context).await?;
    }
    Ok(context.result.unwrap_or(result))
}

//! Controller and action descriptors.
//!
//! Descriptors are immutable once built and shared read-only by every
//! request. An action's invocation strategy is one of a closed set
//! ([`ActionMethod`]): synchronous, task-based (returns a future), or legacy
//! begin/end. The strategy is matched at dispatch time.
//!
//! # Example
//!
//! ```
//! use actionflow_core::descriptor::{ActionDescriptor, ControllerDescriptor, ParameterDescriptor};
//! use actionflow_core::ActionError;
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! # fn main() -> Result<(), ActionError> {
//! let descriptor = ControllerDescriptor::builder::<Greeter>("greeter")
//!     .action(
//!         ActionDescriptor::builder("hello")
//!             .parameter(ParameterDescriptor::required("name"))
//!             .task(|_: Arc<Greeter>, args| async move {
//!                 let name: String = args.parse("name")?;
//!                 Ok::<_, ActionError>(format!("hello {name}"))
//!             }),
//!     )
//!     .build()?;
//!
//! assert!(descriptor.find_action("HELLO").is_some());
//! # Ok(())
//! # }
//! ```

use crate::arguments::Arguments;
use crate::error::ActionError;
use crate::pending::{AsyncCallback, AsyncResult};
use crate::result::{ActionReturn, ActionValue};
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A live controller instance, as created by the controller factory.
pub type ControllerInstance = Arc<dyn Any + Send + Sync>;

/// Future returned by a task-based action, carrying its type-erased return value.
pub type ActionFuture = BoxFuture<'static, Result<Box<dyn Any + Send>, ActionError>>;

/// Type-erased synchronous action method.
pub type SyncMethod =
    Arc<dyn Fn(ControllerInstance, Arguments) -> Result<Option<ActionValue>, ActionError> + Send + Sync>;

/// Type-erased task-based action method.
pub type TaskMethod = Arc<dyn Fn(ControllerInstance, Arguments) -> ActionFuture + Send + Sync>;

/// "Begin" half of a legacy begin/end action.
pub type BeginMethod = Arc<
    dyn Fn(ControllerInstance, Arguments, AsyncCallback) -> Result<Arc<dyn AsyncResult>, ActionError>
        + Send
        + Sync,
>;

/// "End" half of a legacy begin/end action.
pub type EndMethod =
    Arc<dyn Fn(Arc<dyn AsyncResult>) -> Result<Option<ActionValue>, ActionError> + Send + Sync>;

/// Extracts the production value from a type-erased return value.
///
/// Hands the value back unchanged when it is not of the declared type.
pub type ExtractFn = fn(Box<dyn Any + Send>) -> Result<Option<ActionValue>, Box<dyn Any + Send>>;

fn extract_as<T: ActionReturn>(
    value: Box<dyn Any + Send>,
) -> Result<Option<ActionValue>, Box<dyn Any + Send>> {
    value.downcast::<T>().map(|v| v.extract_value())
}

/// Declared return type of a task-based action.
#[derive(Clone, Copy)]
pub struct ReturnType {
    type_id: TypeId,
    type_name: &'static str,
    carries_value: bool,
    extract: ExtractFn,
}

impl ReturnType {
    /// Describe the return type `T`.
    #[must_use]
    pub fn of<T: ActionReturn>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            carries_value: T::CARRIES_VALUE,
            extract: extract_as::<T>,
        }
    }

    /// Type id of the declared type.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the declared type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the type carries a production value.
    #[must_use]
    pub const fn carries_value(&self) -> bool {
        self.carries_value
    }

    /// The extraction function registered for this type.
    #[must_use]
    pub const fn extract_fn(&self) -> ExtractFn {
        self.extract
    }
}

impl PartialEq for ReturnType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ReturnType {}

impl fmt::Debug for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnType")
            .field("type_name", &self.type_name)
            .field("carries_value", &self.carries_value)
            .finish_non_exhaustive()
    }
}

/// How an action is invoked.
#[derive(Clone)]
pub enum ActionMethod {
    /// Runs to completion on the calling task.
    Sync(SyncMethod),
    /// Returns a future.
    Task {
        /// The method
        method: TaskMethod,
        /// Declared return type of the future's value
        returns: ReturnType,
    },
    /// Legacy begin/end pair.
    BeginEnd {
        /// Starts the operation
        begin: BeginMethod,
        /// Retrieves the operation's value or fault
        end: EndMethod,
    },
}

impl ActionMethod {
    /// Whether the strategy is asynchronous.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        !matches!(self, Self::Sync(_))
    }

    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Task { .. } => "task",
            Self::BeginEnd { .. } => "begin_end",
        }
    }
}

impl fmt::Debug for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => write!(f, "ActionMethod::Sync"),
            Self::Task { returns, .. } => f
                .debug_struct("ActionMethod::Task")
                .field("returns", returns)
                .finish_non_exhaustive(),
            Self::BeginEnd { .. } => write!(f, "ActionMethod::BeginEnd"),
        }
    }
}

/// Kind of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Bound from the request
    Value,
    /// Receives the executor's cancellation signal
    Cancellation,
}

/// One declared action parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    /// Parameter name
    pub name: String,
    /// Parameter kind
    pub kind: ParameterKind,
    /// Whether binding fails when no value is supplied
    pub required: bool,
    /// Value used when none is supplied
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    /// A required value parameter.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Value,
            required: true,
            default: None,
        }
    }

    /// An optional value parameter with a default.
    #[must_use]
    pub fn optional(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Value,
            required: false,
            default: Some(default.into()),
        }
    }

    /// The parameter that receives the cancellation signal.
    #[must_use]
    pub fn cancellation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Cancellation,
            required: false,
            default: None,
        }
    }
}

/// Per-action override of the configured asynchronous timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutOverride {
    /// Use the pipeline's configured timeout
    #[default]
    Inherit,
    /// Use this timeout instead
    Fixed(Duration),
    /// Never time out
    Disabled,
}

impl TimeoutOverride {
    /// Effective timeout given the configured default. A zero duration means none.
    #[must_use]
    pub fn resolve(self, configured: Option<Duration>) -> Option<Duration> {
        let timeout = match self {
            Self::Inherit => configured,
            Self::Fixed(duration) => Some(duration),
            Self::Disabled => None,
        };
        timeout.filter(|d| !d.is_zero())
    }
}

/// Describes one invokable action.
#[derive(Debug)]
pub struct ActionDescriptor {
    name: String,
    controller_name: String,
    parameters: Vec<ParameterDescriptor>,
    metadata: BTreeMap<String, String>,
    method: ActionMethod,
    timeout: TimeoutOverride,
}

impl ActionDescriptor {
    /// Start describing an action.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ActionDescriptorBuilder {
        ActionDescriptorBuilder {
            name: name.into(),
            parameters: Vec::new(),
            metadata: BTreeMap::new(),
            method: None,
            timeout: TimeoutOverride::Inherit,
        }
    }

    /// Action name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning controller's name.
    #[must_use]
    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    /// Declared parameters in order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Custom metadata value.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Invocation strategy.
    #[must_use]
    pub const fn method(&self) -> &ActionMethod {
        &self.method
    }

    /// Timeout override.
    #[must_use]
    pub const fn timeout(&self) -> TimeoutOverride {
        self.timeout
    }

    /// Whether the action is asynchronous.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        self.method.is_async()
    }

    /// Position of the cancellation parameter, if declared.
    #[must_use]
    pub fn cancellation_parameter(&self) -> Option<usize> {
        self.parameters
            .iter()
            .position(|p| p.kind == ParameterKind::Cancellation)
    }
}

fn controller_mismatch<C>(action: &str) -> ActionError {
    ActionError::InvalidDescriptor(format!(
        "action `{action}` expects a controller of type `{}`",
        std::any::type_name::<C>()
    ))
}

/// Builder for [`ActionDescriptor`].
pub struct ActionDescriptorBuilder {
    name: String,
    parameters: Vec<ParameterDescriptor>,
    metadata: BTreeMap<String, String>,
    method: Option<ActionMethod>,
    timeout: TimeoutOverride,
}

impl fmt::Debug for ActionDescriptorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptorBuilder")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl ActionDescriptorBuilder {
    /// Declare the next parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Override the configured timeout for this action.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = TimeoutOverride::Fixed(timeout);
        self
    }

    /// Disable the timeout for this action.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = TimeoutOverride::Disabled;
        self
    }

    /// Use an already type-erased method.
    #[must_use]
    pub fn method(mut self, method: ActionMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Register a synchronous method on controller type `C`.
    #[must_use]
    pub fn sync<C, F, R>(self, f: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&C, Arguments) -> Result<R, ActionError> + Send + Sync + 'static,
        R: ActionReturn,
    {
        let action = self.name.clone();
        let method: SyncMethod = Arc::new(move |controller: ControllerInstance, args: Arguments| {
            let controller = controller
                .downcast_ref::<C>()
                .ok_or_else(|| controller_mismatch::<C>(&action))?;
            f(controller, args).map(ActionReturn::extract_value)
        });
        self.method(ActionMethod::Sync(method))
    }

    /// Register a task-based method on controller type `C` returning `T`.
    #[must_use]
    pub fn task<C, F, Fut, T>(self, f: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ActionError>> + Send + 'static,
        T: ActionReturn,
    {
        let action = self.name.clone();
        let method: TaskMethod = Arc::new(
            move |controller: ControllerInstance, args: Arguments| -> ActionFuture {
                match controller.downcast::<C>() {
                    Ok(controller) => {
                        let future = f(controller, args);
                        Box::pin(async move {
                            future
                                .await
                                .map(|value| Box::new(value) as Box<dyn Any + Send>)
                        })
                    }
                    Err(_) => {
                        let error = controller_mismatch::<C>(&action);
                        Box::pin(async move { Err(error) })
                    }
                }
            },
        );
        self.method(ActionMethod::Task {
            method,
            returns: ReturnType::of::<T>(),
        })
    }

    /// Register a legacy begin/end pair on controller type `C`.
    #[must_use]
    pub fn begin_end<C, B, E, R>(self, begin: B, end: E) -> Self
    where
        C: Any + Send + Sync,
        B: Fn(Arc<C>, Arguments, AsyncCallback) -> Result<Arc<dyn AsyncResult>, ActionError>
            + Send
            + Sync
            + 'static,
        E: Fn(Arc<dyn AsyncResult>) -> Result<R, ActionError> + Send + Sync + 'static,
        R: ActionReturn,
    {
        let action = self.name.clone();
        let begin_method: BeginMethod = Arc::new(
            move |controller: ControllerInstance, args: Arguments, callback: AsyncCallback| {
                let controller = controller
                    .downcast::<C>()
                    .map_err(|_| controller_mismatch::<C>(&action))?;
                begin(controller, args, callback)
            },
        );
        let end_method: EndMethod = Arc::new(move |handle: Arc<dyn AsyncResult>| {
            end(handle).map(ActionReturn::extract_value)
        });
        self.method(ActionMethod::BeginEnd {
            begin: begin_method,
            end: end_method,
        })
    }

    /// Finish the descriptor for the named controller.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidDescriptor`] if no method was registered or
    /// more than one cancellation parameter is declared.
    pub fn build(self, controller_name: &str) -> Result<ActionDescriptor, ActionError> {
        let method = self.method.ok_or_else(|| {
            ActionError::InvalidDescriptor(format!("action `{}` has no method", self.name))
        })?;

        let cancellation_parameters = self
            .parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::Cancellation)
            .count();
        if cancellation_parameters > 1 {
            return Err(ActionError::InvalidDescriptor(format!(
                "action `{}` declares {cancellation_parameters} cancellation parameters; at most one is supported",
                self.name
            )));
        }

        Ok(ActionDescriptor {
            name: self.name,
            controller_name: controller_name.to_string(),
            parameters: self.parameters,
            metadata: self.metadata,
            method,
            timeout: self.timeout,
        })
    }
}

/// Describes a controller type and the actions it exposes.
#[derive(Debug)]
pub struct ControllerDescriptor {
    name: String,
    controller_type: TypeId,
    type_name: &'static str,
    validate_request: bool,
    actions: Vec<Arc<ActionDescriptor>>,
}

impl ControllerDescriptor {
    /// Start describing controller type `C`.
    #[must_use]
    pub fn builder<C: Any>(name: impl Into<String>) -> ControllerDescriptorBuilder {
        ControllerDescriptorBuilder {
            name: name.into(),
            controller_type: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            validate_request: true,
            actions: Vec::new(),
        }
    }

    /// Controller name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type id of the controller type.
    #[must_use]
    pub const fn controller_type(&self) -> TypeId {
        self.controller_type
    }

    /// Name of the controller type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether requests to this controller are validated before binding.
    #[must_use]
    pub const fn validate_request(&self) -> bool {
        self.validate_request
    }

    /// All actions.
    #[must_use]
    pub fn actions(&self) -> &[Arc<ActionDescriptor>] {
        &self.actions
    }

    /// Find an action by name, ignoring ASCII case.
    #[must_use]
    pub fn find_action(&self, name: &str) -> Option<Arc<ActionDescriptor>> {
        self.actions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// Builder for [`ControllerDescriptor`].
#[derive(Debug)]
pub struct ControllerDescriptorBuilder {
    name: String,
    controller_type: TypeId,
    type_name: &'static str,
    validate_request: bool,
    actions: Vec<ActionDescriptorBuilder>,
}

impl ControllerDescriptorBuilder {
    /// Enable or disable request validation (enabled by default).
    #[must_use]
    pub const fn validate_request(mut self, enabled: bool) -> Self {
        self.validate_request = enabled;
        self
    }

    /// Add an action.
    #[must_use]
    pub fn action(mut self, action: ActionDescriptorBuilder) -> Self {
        self.actions.push(action);
        self
    }

    /// Build the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::InvalidDescriptor`] if an action is invalid or two
    /// actions share a name (ignoring ASCII case).
    pub fn build(self) -> Result<ControllerDescriptor, ActionError> {
        let mut actions: Vec<Arc<ActionDescriptor>> = Vec::with_capacity(self.actions.len());
        for builder in self.actions {
            let action = builder.build(&self.name)?;
            if actions
                .iter()
                .any(|a| a.name.eq_ignore_ascii_case(&action.name))
            {
                return Err(ActionError::InvalidDescriptor(format!(
                    "controller `{}` declares action `{}` more than once",
                    self.name, action.name
                )));
            }
            actions.push(Arc::new(action));
        }

        Ok(ControllerDescriptor {
            name: self.name,
            controller_type: self.controller_type,
            type_name: self.type_name,
            validate_request: self.validate_request,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ActionResult;

    struct Orders;

    #[test]
    fn duplicate_action_names_are_rejected() {
        let result = ControllerDescriptor::builder::<Orders>("orders")
            .action(ActionDescriptor::builder("List").sync(|_: &Orders, _| Ok(())))
            .action(ActionDescriptor::builder("list").sync(|_: &Orders, _| Ok(())))
            .build();

        assert!(matches!(result, Err(ActionError::InvalidDescriptor(_))));
    }

    #[test]
    fn two_cancellation_parameters_are_rejected() {
        let result = ActionDescriptor::builder("poll")
            .parameter(ParameterDescriptor::cancellation("first"))
            .parameter(ParameterDescriptor::cancellation("second"))
            .task(|_: Arc<Orders>, _| async { Ok(()) })
            .build("orders");

        assert!(matches!(result, Err(ActionError::InvalidDescriptor(_))));
    }

    #[test]
    fn metadata_is_kept_by_key() {
        let descriptor = ActionDescriptor::builder("export")
            .metadata("http_method", "POST")
            .metadata("http_method", "PUT")
            .metadata("area", "reports")
            .sync(|_: &Orders, _| Ok(()))
            .build("orders");

        let Ok(descriptor) = descriptor else {
            unreachable!("descriptor is valid");
        };
        assert_eq!(descriptor.metadata("http_method"), Some("PUT"));
        assert_eq!(descriptor.metadata("area"), Some("reports"));
        assert_eq!(descriptor.metadata("missing"), None);
    }

    #[test]
    fn missing_method_is_rejected() {
        let result = ActionDescriptor::builder("empty").build("orders");
        assert!(matches!(result, Err(ActionError::InvalidDescriptor(_))));
    }

    #[test]
    fn task_action_declares_its_return_type() {
        let descriptor = ActionDescriptor::builder("show")
            .parameter(ParameterDescriptor::cancellation("token"))
            .task(|_: Arc<Orders>, _| async { Ok(ActionResult::status(204)) })
            .build("orders");

        let Ok(descriptor) = descriptor else {
            unreachable!("descriptor is valid");
        };
        assert!(descriptor.is_async());
        assert_eq!(descriptor.cancellation_parameter(), Some(0));
        match descriptor.method() {
            ActionMethod::Task { returns, .. } => {
                assert_eq!(*returns, ReturnType::of::<ActionResult>());
                assert!(returns.carries_value());
            }
            other => unreachable!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn sync_action_rejects_foreign_controller() {
        let descriptor = ActionDescriptor::builder("list")
            .sync(|_: &Orders, _| Ok("ok"))
            .build("orders");
        let Ok(descriptor) = descriptor else {
            unreachable!("descriptor is valid");
        };
        let ActionMethod::Sync(method) = descriptor.method() else {
            unreachable!("registered as sync");
        };

        let foreign: ControllerInstance = Arc::new(42_u32);
        let result = method(foreign, Arguments::new("list"));
        assert!(matches!(result, Err(ActionError::InvalidDescriptor(_))));
    }

    #[test]
    fn zero_timeout_means_none() {
        assert_eq!(TimeoutOverride::Inherit.resolve(Some(Duration::ZERO)), None);
        assert_eq!(
            TimeoutOverride::Fixed(Duration::from_secs(1)).resolve(None),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            TimeoutOverride::Disabled.resolve(Some(Duration::from_secs(9))),
            None
        );
    }
}

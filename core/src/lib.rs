//! # Actionflow Core
//!
//! Types and contracts for an asynchronous action-invocation pipeline.
//!
//! A request addressed to a controller action passes through ordered filter
//! stages (authentication, authorization, action, exception, result) around
//! the action method itself. This crate holds the vocabulary those stages
//! share; the execution engine lives in `actionflow-runtime`.
//!
//! ## Core Concepts
//!
//! - **Descriptor**: immutable description of a controller and its actions
//! - **Filter**: cross-cutting hook run around an action or its result
//! - **Context**: per-invocation payload a filter reads and writes
//! - **`PendingComputation`**: handle to in-flight work, awaitable or blockable
//! - **Collaborator**: external service (factory, binder, result executor)
//!   reached through a narrow trait
//!
//! ## Example
//!
//! ```
//! use actionflow_core::descriptor::{ActionDescriptor, ControllerDescriptor};
//! use actionflow_core::{ActionError, ActionResult};
//!
//! struct Health;
//!
//! # fn main() -> Result<(), ActionError> {
//! let health = ControllerDescriptor::builder::<Health>("health")
//!     .action(ActionDescriptor::builder("ping").sync(|_: &Health, _| Ok(ActionResult::status(204))))
//!     .build()?;
//!
//! assert_eq!(health.actions().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod ambient;
pub mod arguments;
pub mod context;
pub mod contracts;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod pending;
pub mod request;
pub mod result;

pub use arguments::{Argument, Arguments, Parameters};
pub use context::{
    ActionExecutedContext, ActionExecutingContext, AuthenticationChallengeContext,
    AuthenticationContext, AuthorizationContext, ExceptionContext, ResultExecutedContext,
    ResultExecutingContext,
};
pub use contracts::{
    ControllerFactory, DescriptorProvider, FilterProvider, ParameterBinder, RequestValidator,
    ResultExecutor,
};
pub use descriptor::{
    ActionDescriptor, ActionMethod, ControllerDescriptor, ControllerInstance, ParameterDescriptor,
    ReturnType, TimeoutOverride,
};
pub use error::ActionError;
pub use filter::{
    ActionFilter, AuthenticationFilter, AuthorizationFilter, ExceptionFilter, FilterSet,
    ResultFilter,
};
pub use pending::{
    AsyncCallback, AsyncResult, AsyncState, CompletionSource, ComputationStatus, Outcome,
    PendingComputation,
};
pub use request::{Principal, RequestContext};
pub use result::{ActionResult, ActionReturn, ActionValue};

// Re-exported so downstream crates name the same types.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

//! # Actionflow Runtime
//!
//! Execution engine for the actionflow action-invocation pipeline.
//!
//! This crate drives a request through the filter stages declared in
//! `actionflow-core` and invokes the action itself, whichever of the three
//! invocation strategies it was registered with.
//!
//! ## Core Components
//!
//! - **`ActionInvoker`**: the orchestrator; one call per request
//! - **`ActionChain` / `ResultChain`**: run filters around the action and its result
//! - **`ActionExecutor`**: binds arguments, enforces the async timeout, extracts values
//! - **`interop`**: bridges `PendingComputation` and the begin/end convention
//! - **`ControllerRegistry` / `FilterRegistry` / `RouteValueBinder`**: default collaborators
//!
//! ## Example
//!
//! ```
//! use actionflow_core::{async_trait, ActionDescriptor, ActionError, ActionResult};
//! use actionflow_core::{RequestContext, ResultExecutor};
//! use actionflow_runtime::{ActionInvoker, ControllerRegistry, PipelineConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Greeter;
//! struct Stdout;
//!
//! #[async_trait]
//! impl ResultExecutor for Stdout {
//!     async fn execute(
//!         &self,
//!         _request: &RequestContext,
//!         _action: &ActionDescriptor,
//!         result: &ActionResult,
//!     ) -> Result<(), ActionError> {
//!         println!("{result:?}");
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ActionError> {
//! let mut registry = ControllerRegistry::default();
//! registry.register("greeter", || Greeter, |c| {
//!     c.action(ActionDescriptor::builder("hello").task(|_: Arc<Greeter>, args| async move {
//!         let name: String = args.parse("name")?;
//!         Ok::<_, ActionError>(format!("hello, {name}"))
//!     }).parameter(actionflow_core::ParameterDescriptor::optional("name", "world")))
//! })?;
//!
//! let invoker = ActionInvoker::from_registry(Arc::new(registry), Arc::new(Stdout))
//!     .with_config(PipelineConfig::default().with_async_timeout(Some(Duration::from_secs(5))))
//!     .build();
//!
//! let request = Arc::new(RequestContext::new("greeter").with_query_value("name", "ferris"));
//! assert!(invoker.invoke_action(request, "hello").await?);
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod cache;
pub mod chain;
pub mod config;
pub mod executor;
pub mod extractor;
pub mod interop;
pub mod invoker;
pub mod metrics;
pub mod provider;
pub mod registry;

pub use binding::RouteValueBinder;
pub use cache::DescriptorCache;
pub use chain::{ActionChain, ResultChain};
pub use config::{ConfigError, PipelineConfig};
pub use executor::ActionExecutor;
pub use extractor::{Extractor, ExtractorRegistry};
pub use interop::TaskAsyncResult;
pub use invoker::{ActionInvoker, ActionInvokerBuilder, ControllerLease};
pub use metrics::{MetricsError, MetricsRecorder};
pub use provider::FilterRegistry;
pub use registry::ControllerRegistry;

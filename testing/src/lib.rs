//! # Actionflow Testing
//!
//! Testing utilities and helpers for the actionflow pipeline.
//!
//! This crate provides:
//! - A shared [`Journal`] that fakes record into, for ordering assertions
//! - Recording implementations of every filter trait
//! - In-memory collaborators (result executor, counting controller factory, validator)
//! - proptest strategies for filter-chain scenarios
//!
//! ## Example
//!
//! ```
//! use actionflow_core::{ActionResult, FilterSet};
//! use actionflow_testing::{Journal, RecordingActionFilter};
//! use std::sync::Arc;
//!
//! let journal = Journal::new();
//! let filters = FilterSet::new()
//!     .with_action(Arc::new(RecordingActionFilter::new("outer", &journal)))
//!     .with_action(Arc::new(
//!         RecordingActionFilter::new("inner", &journal).short_circuit(ActionResult::status(304)),
//!     ));
//!
//! assert_eq!(filters.action.len(), 2);
//! ```

pub mod filters;
pub mod journal;
pub mod mocks;
pub mod properties;

pub use filters::{
    Failure, RecordingActionFilter, RecordingAuthenticationFilter, RecordingAuthorizationFilter,
    RecordingExceptionFilter, RecordingResultFilter,
};
pub use journal::Journal;
pub use mocks::{CountingControllerFactory, RecordingResultExecutor, RejectingValidator};
pub use properties::{ChainScenario, chain_scenario};

/// Install a `tracing` subscriber for test output.
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use actionflow_core::{
        ActionDescriptor, ActionError, ActionExecutedContext, ActionExecutingContext, ActionFilter,
        ActionResult, ExceptionContext, ExceptionFilter, RequestContext,
    };
    use std::sync::Arc;

    struct Probe;

    fn contexts() -> (Arc<RequestContext>, Arc<ActionDescriptor>) {
        let descriptor = ActionDescriptor::builder("probe")
            .sync(|_: &Probe, _| Ok(()))
            .build("probes")
            .unwrap();
        (Arc::new(RequestContext::new("probes")), Arc::new(descriptor))
    }

    #[tokio::test]
    async fn action_filter_records_and_short_circuits() {
        let journal = Journal::new();
        let filter = RecordingActionFilter::new("a", &journal).short_circuit(ActionResult::status(304));
        let (request, descriptor) = contexts();
        let mut ctx = ActionExecutingContext::new(
            request,
            descriptor,
            Arc::new(Probe),
            actionflow_core::Parameters::new(),
        );

        filter.on_action_executing(&mut ctx).await.unwrap();

        assert_eq!(ctx.result, Some(ActionResult::status(304)));
        assert_eq!(journal.entries(), ["a.executing"]);
    }

    #[tokio::test]
    async fn action_filter_handles_faults() {
        let journal = Journal::new();
        let filter = RecordingActionFilter::new("a", &journal).handle(ActionResult::status(503));
        let (request, descriptor) = contexts();
        let mut ctx =
            ActionExecutedContext::faulted(request, descriptor, Failure::fault("boom").to_error());

        filter.on_action_executed(&mut ctx).await.unwrap();

        assert!(ctx.exception_handled);
        assert_eq!(ctx.result, Some(ActionResult::status(503)));
        assert_eq!(journal.entries(), ["a.executed:fault"]);
    }

    #[tokio::test]
    async fn exception_filter_records_the_fault_kind() {
        let journal = Journal::new();
        let filter = RecordingExceptionFilter::new("x", &journal);
        let (request, descriptor) = contexts();
        let mut ctx = ExceptionContext::new(request, descriptor, ActionError::Canceled);

        filter.on_exception(&mut ctx).await.unwrap();

        assert!(!ctx.exception_handled);
        assert!(journal.contains("x.exception:canceled"));
    }

    #[test]
    fn failures_build_the_matching_error() {
        assert!(Failure::abort("redirect").to_error().is_host_abort());
        assert_eq!(Failure::fault("boom").to_error().to_string(), "boom");
    }

    #[test]
    fn scenario_counts_entered_filters() {
        let scenario = ChainScenario {
            filters: 5,
            short_circuit_at: Some(2),
            handle_at: None,
            action_faults: false,
        };
        assert_eq!(scenario.entered(), 3);
        assert!(!scenario.action_runs());
    }
}

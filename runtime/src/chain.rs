//! Filter chain engine.
//!
//! The action chain runs every action filter's pre-hook in ascending order,
//! then the action, then the post-hooks in descending order. It is driven as
//! an explicit state machine: a forward loop records how many filters were
//! entered, and an unwind loop carries the current [`Disposition`] outward.
//! Long filter lists therefore never grow the call stack.
//!
//! Rules, for filter `i`:
//!
//! - a pre-hook that supplies a result short-circuits: the action and deeper
//!   filters never run, and unwinding starts at `i - 1` with a canceled context
//! - a pre-hook that fails starts unwinding at `i - 1` with that fault
//! - a post-hook that sees a fault handles it by setting `exception_handled`
//!   or clearing `exception`; outer filters then see the supplied result
//! - a fault raised by a post-hook replaces the current disposition
//! - a host abort is never offered as a fault: post-hooks see a context with
//!   no exception and no cancellation, and the abort is re-raised untouched
//!
//! The result chain follows the same ordering discipline around result
//! execution, but its filters can only cancel, never recover a fault.

use crate::executor::ActionExecutor;
use crate::metrics::{InvocationMetrics, ShortCircuitStage};
use actionflow_core::{
    ActionDescriptor, ActionError, ActionExecutedContext, ActionExecutingContext, ActionFilter,
    ActionResult, ControllerInstance, Parameters, RequestContext, ResultExecutedContext,
    ResultExecutingContext, ResultExecutor, ResultFilter,
};
use std::sync::Arc;

/// State carried outward while unwinding the action chain.
#[derive(Debug)]
enum Disposition {
    /// The action (or a short-circuit, or a handled fault) produced a context
    Completed(ActionExecutedContext),
    /// An unhandled fault
    Faulted(ActionError),
    /// A host abort, passed through untouched
    Aborted(ActionError),
}

impl Disposition {
    fn from_result(result: Result<ActionExecutedContext, ActionError>) -> Self {
        match result {
            Ok(context) => Self::Completed(context),
            Err(error) if error.is_host_abort() => Self::Aborted(error),
            Err(error) => Self::Faulted(error),
        }
    }
}

/// Runs action filters around the action method.
#[derive(Debug, Clone)]
pub struct ActionChain {
    executor: ActionExecutor,
}

impl ActionChain {
    /// Create a chain that invokes actions through `executor`.
    #[must_use]
    pub const fn new(executor: ActionExecutor) -> Self {
        Self { executor }
    }

    /// Run `filters` around the action.
    ///
    /// # Errors
    ///
    /// Returns the fault no post-hook handled, or a host abort.
    pub async fn run(
        &self,
        request: &Arc<RequestContext>,
        descriptor: &Arc<ActionDescriptor>,
        controller: ControllerInstance,
        filters: &[Arc<dyn ActionFilter>],
        parameters: Parameters,
    ) -> Result<ActionExecutedContext, ActionError> {
        let mut executing = ActionExecutingContext::new(
            Arc::clone(request),
            Arc::clone(descriptor),
            controller,
            parameters,
        );

        // Forward: pre-hooks in ascending order.
        let mut entered = 0;
        let mut outcome = None;
        for (index, filter) in filters.iter().enumerate() {
            tracing::trace!(filter = index, "Running action filter pre-hook");
            if let Err(error) = filter.on_action_executing(&mut executing).await {
                outcome = Some(Err(error));
                break;
            }
            if let Some(result) = executing.result.take() {
                tracing::debug!(filter = index, "Action filter short-circuited");
                InvocationMetrics::record_short_circuit(ShortCircuitStage::ActionFilter);
                outcome = Some(Ok(ActionExecutedContext::short_circuited(
                    Arc::clone(request),
                    Arc::clone(descriptor),
                    result,
                )));
                break;
            }
            entered = index + 1;
        }

        // Middle: the action, only if every pre-hook passed.
        let outcome = match outcome {
            Some(outcome) => outcome,
            None => self
                .executor
                .execute(
                    request,
                    descriptor,
                    Arc::clone(&executing.controller),
                    &executing.parameters,
                )
                .await
                .map(|value| {
                    ActionExecutedContext::completed(
                        Arc::clone(request),
                        Arc::clone(descriptor),
                        ActionResult::from_value(value),
                    )
                }),
        };

        // Backward: post-hooks in descending order.
        let mut disposition = Disposition::from_result(outcome);
        for (index, filter) in filters[..entered].iter().enumerate().rev() {
            tracing::trace!(filter = index, "Running action filter post-hook");
            disposition = unwind(filter.as_ref(), request, descriptor, disposition).await;
        }

        match disposition {
            Disposition::Completed(mut context) => match context.exception.take() {
                Some(error) if !context.exception_handled => Err(error),
                _ => Ok(context),
            },
            Disposition::Faulted(error) | Disposition::Aborted(error) => Err(error),
        }
    }
}

/// Run one filter's post-hook against the current disposition.
async fn unwind(
    filter: &dyn ActionFilter,
    request: &Arc<RequestContext>,
    descriptor: &Arc<ActionDescriptor>,
    disposition: Disposition,
) -> Disposition {
    match disposition {
        Disposition::Completed(mut context) => match filter.on_action_executed(&mut context).await {
            Ok(()) => Disposition::Completed(context),
            Err(error) => Disposition::from_result(Err(error)),
        },
        Disposition::Faulted(error) => {
            let mut context =
                ActionExecutedContext::faulted(Arc::clone(request), Arc::clone(descriptor), error);
            if let Err(error) = filter.on_action_executed(&mut context).await {
                return Disposition::from_result(Err(error));
            }
            match context.exception.take() {
                Some(error) if !context.exception_handled => Disposition::Faulted(error),
                _ => {
                    tracing::debug!("Action filter handled the fault");
                    context.exception_handled = true;
                    Disposition::Completed(context)
                }
            }
        }
        Disposition::Aborted(abort) => {
            let mut context =
                ActionExecutedContext::aborted(Arc::clone(request), Arc::clone(descriptor));
            if let Err(error) = filter.on_action_executed(&mut context).await {
                tracing::error!(
                    error = %error,
                    "Action filter failed while a host abort was unwinding; keeping the abort"
                );
            }
            Disposition::Aborted(abort)
        }
    }
}

/// Runs result filters around result execution.
#[derive(Clone)]
pub struct ResultChain {
    executor: Arc<dyn ResultExecutor>,
}

impl std::fmt::Debug for ResultChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultChain").finish_non_exhaustive()
    }
}

impl ResultChain {
    /// Create a chain that executes results through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn ResultExecutor>) -> Self {
        Self { executor }
    }

    /// Execute `result` without any result filters.
    ///
    /// # Errors
    ///
    /// Whatever the result executor raises.
    pub async fn execute(
        &self,
        request: &RequestContext,
        descriptor: &ActionDescriptor,
        result: &ActionResult,
    ) -> Result<(), ActionError> {
        self.executor.execute(request, descriptor, result).await
    }

    /// Run `filters` around the execution of `result`.
    ///
    /// A pre-hook that sets `cancel` stops deeper filters and the execution;
    /// outer post-hooks still run and see `canceled = true`.
    ///
    /// # Errors
    ///
    /// Returns the last fault raised by the execution or any hook, or a host
    /// abort.
    pub async fn run(
        &self,
        request: &Arc<RequestContext>,
        descriptor: &Arc<ActionDescriptor>,
        filters: &[Arc<dyn ResultFilter>],
        result: ActionResult,
    ) -> Result<(), ActionError> {
        let mut executing = ResultExecutingContext::new(
            Arc::clone(request),
            Arc::clone(descriptor),
            result,
        );

        let mut entered = 0;
        let mut canceled = false;
        let mut fault = None;
        for (index, filter) in filters.iter().enumerate() {
            tracing::trace!(filter = index, "Running result filter pre-hook");
            if let Err(error) = filter.on_result_executing(&mut executing).await {
                fault = Some(error);
                break;
            }
            if executing.cancel {
                tracing::debug!(filter = index, "Result filter canceled result execution");
                InvocationMetrics::record_short_circuit(ShortCircuitStage::ResultFilter);
                canceled = true;
                break;
            }
            entered = index + 1;
        }

        if fault.is_none() && !canceled {
            fault = self
                .executor
                .execute(request, descriptor, &executing.result)
                .await
                .err();
        }

        let mut abort = fault.take_if(|error| error.is_host_abort());
        for (index, filter) in filters[..entered].iter().enumerate().rev() {
            tracing::trace!(filter = index, "Running result filter post-hook");
            let mut context = ResultExecutedContext::new(
                Arc::clone(request),
                Arc::clone(descriptor),
                executing.result.clone(),
                canceled,
                fault.take(),
            );
            let hook = filter.on_result_executed(&mut context).await;
            fault = context.into_exception();

            if let Err(error) = hook {
                if abort.is_some() {
                    tracing::error!(
                        error = %error,
                        "Result filter failed while a host abort was unwinding; keeping the abort"
                    );
                } else if error.is_host_abort() {
                    abort = Some(error);
                    fault = None;
                } else {
                    fault = Some(error);
                }
            }
        }

        match (abort, fault) {
            (Some(error), _) | (None, Some(error)) => Err(error),
            (None, None) => Ok(()),
        }
    }
}

//! Action-method executor.
//!
//! Binds the positional arguments of an action, dispatches on its invocation
//! strategy and normalizes the outcome. Asynchronous actions that declare a
//! cancellation parameter get a fresh [`CancellationToken`] and, when a
//! timeout applies, a one-shot timer that cancels it.
//!
//! Outcome precedence once the action's computation finishes:
//!
//! 1. the timer fired: [`ActionError::Timeout`], whatever the action returned
//! 2. the action faulted: that fault
//! 3. the action was canceled: [`ActionError::Canceled`]
//! 4. otherwise the value extracted through the [`ExtractorRegistry`]

use crate::extractor::ExtractorRegistry;
use crate::interop;
use crate::metrics::InvocationMetrics;
use actionflow_core::ambient::{self, AmbientRequest};
use actionflow_core::descriptor::{ActionMethod, ParameterKind};
use actionflow_core::{
    ActionDescriptor, ActionError, ActionValue, Argument, Arguments, CancellationToken,
    ControllerInstance, Parameters, RequestContext,
};
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Invokes one action method.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    extractors: Arc<ExtractorRegistry>,
    async_timeout: Option<Duration>,
}

impl ActionExecutor {
    /// Create an executor with the configured asynchronous timeout.
    #[must_use]
    pub const fn new(extractors: Arc<ExtractorRegistry>, async_timeout: Option<Duration>) -> Self {
        Self {
            extractors,
            async_timeout,
        }
    }

    /// Run the action and return its production value.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Binding`] if a required parameter is missing,
    /// [`ActionError::Timeout`] if the pipeline timer canceled the action, or
    /// whatever fault the action raised.
    pub async fn execute(
        &self,
        request: &RequestContext,
        descriptor: &ActionDescriptor,
        controller: ControllerInstance,
        parameters: &Parameters,
    ) -> Result<Option<ActionValue>, ActionError> {
        let cancellation = descriptor
            .cancellation_parameter()
            .map(|_| CancellationToken::new());
        let arguments = bind_arguments(descriptor, parameters, cancellation.as_ref())?;

        tracing::trace!(
            action = descriptor.name(),
            strategy = descriptor.method().kind(),
            "Invoking action method"
        );

        match descriptor.method() {
            ActionMethod::Sync(method) => {
                let _scope = ambient::enter(ambient_request(request, descriptor));
                method(controller, arguments)
            }
            ActionMethod::Task { method, returns } => {
                let future = method(controller, arguments);
                let value = self.guard(descriptor, cancellation, future).await?;
                self.extractors.get(returns).extract(descriptor.name(), value)
            }
            ActionMethod::BeginEnd { begin, end } => {
                let end = Arc::clone(end);
                let computation = interop::from_begin_end(
                    |callback| begin(controller, arguments, callback),
                    move |handle| end(handle),
                );
                self.guard(descriptor, cancellation, computation.into_result())
                    .await
            }
        }
    }

    /// Await `inner` under the timeout, if one applies.
    async fn guard<T>(
        &self,
        descriptor: &ActionDescriptor,
        cancellation: Option<CancellationToken>,
        inner: impl Future<Output = Result<T, ActionError>>,
    ) -> Result<T, ActionError> {
        let timeout = descriptor.timeout().resolve(self.async_timeout);
        let timer = match (cancellation, timeout) {
            (Some(token), Some(timeout)) => Some(TimeoutTimer::start(token, timeout)),
            _ => None,
        };

        let result = inner.await;

        match timer.map(TimeoutTimer::retire) {
            Some(Some(timeout)) => {
                InvocationMetrics::record_timeout();
                tracing::warn!(
                    action = descriptor.name(),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Asynchronous action timed out"
                );
                Err(ActionError::Timeout {
                    action: descriptor.name().to_string(),
                    timeout,
                })
            }
            _ => result,
        }
    }
}

fn ambient_request(request: &RequestContext, descriptor: &ActionDescriptor) -> AmbientRequest {
    AmbientRequest {
        request_id: request.request_id(),
        controller: descriptor.controller_name().to_string(),
        action: descriptor.name().to_string(),
    }
}

/// Build positional arguments from the bound parameter mapping.
///
/// Missing optional parameters take their default (or `null`); the
/// cancellation parameter receives `cancellation`.
///
/// # Errors
///
/// Returns [`ActionError::Binding`] if a required parameter is missing.
pub fn bind_arguments(
    descriptor: &ActionDescriptor,
    parameters: &Parameters,
    cancellation: Option<&CancellationToken>,
) -> Result<Arguments, ActionError> {
    let mut arguments = Arguments::new(descriptor.name());
    for parameter in descriptor.parameters() {
        let argument = match parameter.kind {
            ParameterKind::Cancellation => {
                Argument::Cancellation(cancellation.cloned().unwrap_or_default())
            }
            ParameterKind::Value => match parameters.get(&parameter.name) {
                Some(value) => Argument::Value(value.clone()),
                None if parameter.required => {
                    return Err(ActionError::Binding {
                        action: descriptor.name().to_string(),
                        parameter: parameter.name.clone(),
                        reason: "no value was bound".to_string(),
                    });
                }
                None => Argument::Value(parameter.default.clone().unwrap_or(Value::Null)),
            },
        };
        arguments.push(parameter.name.clone(), argument);
    }
    Ok(arguments)
}

#[derive(Debug, Default)]
struct TimerState {
    retired: bool,
    fired: bool,
}

/// One-shot timer canceling a token unless retired first.
///
/// The firing path and [`retire`](Self::retire) serialize on the same lock, so
/// a late firing after retirement never cancels the token. Dropping the timer
/// aborts its task, which covers an invocation dropped mid-action.
struct TimeoutTimer {
    state: Arc<Mutex<TimerState>>,
    task: JoinHandle<()>,
    timeout: Duration,
}

fn lock(state: &Mutex<TimerState>) -> MutexGuard<'_, TimerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TimeoutTimer {
    fn start(token: CancellationToken, timeout: Duration) -> Self {
        let state = Arc::new(Mutex::new(TimerState::default()));
        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut state = lock(&shared);
            if !state.retired {
                state.fired = true;
                token.cancel();
            }
        });

        Self {
            state,
            task,
            timeout,
        }
    }

    /// Stop the timer. Returns the timeout if it fired before retirement.
    fn retire(self) -> Option<Duration> {
        let fired = {
            let mut state = lock(&self.state);
            state.retired = true;
            state.fired
        };
        fired.then_some(self.timeout)
    }
}

impl Drop for TimeoutTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use actionflow_core::{ActionResult, ParameterDescriptor};
    use serde_json::json;

    struct Reports;

    fn executor(timeout: Option<Duration>) -> ActionExecutor {
        ActionExecutor::new(Arc::new(ExtractorRegistry::new()), timeout)
    }

    fn build(action: actionflow_core::descriptor::ActionDescriptorBuilder) -> ActionDescriptor {
        match action.build("reports") {
            Ok(descriptor) => descriptor,
            Err(e) => unreachable!("invalid test descriptor: {e}"),
        }
    }

    fn controller() -> ControllerInstance {
        Arc::new(Reports)
    }

    fn request() -> RequestContext {
        RequestContext::new("reports")
    }

    #[tokio::test(start_paused = true)]
    async fn timer_cancellation_surfaces_as_timeout() {
        let descriptor = build(
            ActionDescriptor::builder("slow")
                .parameter(ParameterDescriptor::cancellation("token"))
                .task(|_: Arc<Reports>, args: Arguments| async move {
                    let token = args.cancellation_token().cloned().unwrap_or_default();
                    token.cancelled().await;
                    Err::<(), _>(ActionError::Canceled)
                }),
        );

        let result = executor(Some(Duration::from_secs(2)))
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert!(matches!(
            result,
            Err(ActionError::Timeout { timeout, .. }) if timeout == Duration::from_secs(2)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wins_over_an_unrelated_fault() {
        let descriptor = build(
            ActionDescriptor::builder("slow")
                .parameter(ParameterDescriptor::cancellation("token"))
                .task(|_: Arc<Reports>, _| async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Err::<(), _>(ActionError::action(anyhow::anyhow!("disk full")))
                }),
        );

        let result = executor(Some(Duration::from_secs(1)))
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert!(result.is_err_and(|e| e.is_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn self_cancellation_is_not_a_timeout() {
        let descriptor = build(
            ActionDescriptor::builder("quit")
                .parameter(ParameterDescriptor::cancellation("token"))
                .task(|_: Arc<Reports>, _| async { Err::<(), _>(ActionError::Canceled) }),
        );

        let result = executor(Some(Duration::from_secs(1)))
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert!(result.is_err_and(|e| e.is_canceled()));
    }

    #[tokio::test(start_paused = true)]
    async fn no_cancellation_parameter_means_no_timer() {
        let descriptor = build(ActionDescriptor::builder("long").task(|_: Arc<Reports>, _| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<_, ActionError>("finished".to_string())
        }));

        let result = executor(Some(Duration::from_millis(5)))
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert_eq!(result.ok().flatten(), Some(ActionValue::Text("finished".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn per_action_override_disables_the_timeout() {
        let descriptor = build(
            ActionDescriptor::builder("export")
                .parameter(ParameterDescriptor::cancellation("token"))
                .no_timeout()
                .task(|_: Arc<Reports>, _| async {
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    Ok::<_, ActionError>(())
                }),
        );

        let result = executor(Some(Duration::from_secs(1)))
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert!(matches!(result, Ok(None)));
    }

    /// Task action that hands its cancellation token to `slot`, then runs `body`.
    fn handing_out_token<F, Fut>(
        slot: &Arc<Mutex<Option<CancellationToken>>>,
        body: F,
    ) -> ActionDescriptor
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<&'static str, ActionError>> + Send + 'static,
    {
        let slot = Arc::clone(slot);
        build(
            ActionDescriptor::builder("hand_out")
                .parameter(ParameterDescriptor::cancellation("token"))
                .task(move |_: Arc<Reports>, args: Arguments| {
                    *slot.lock().unwrap() = args.cancellation_token().cloned();
                    body()
                }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn late_timer_neither_cancels_nor_times_out_a_finished_action() {
        let slot = Arc::new(Mutex::new(None));
        let descriptor = handing_out_token(&slot, || async { Ok("done") });

        let result = executor(Some(Duration::from_secs(1)))
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(result.ok().flatten(), Some(ActionValue::Text("done".into())));
        let token = slot.lock().unwrap().clone().unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_execution_stops_its_timer() {
        let slot = Arc::new(Mutex::new(None));
        let descriptor = handing_out_token(&slot, || async {
            std::future::pending::<()>().await;
            Ok("unreachable")
        });
        let executor = executor(Some(Duration::from_secs(45)));

        let dropped = tokio::time::timeout(
            Duration::from_secs(1),
            executor.execute(&request(), &descriptor, controller(), &Parameters::new()),
        )
        .await;
        tokio::time::sleep(Duration::from_secs(50)).await;

        assert!(dropped.is_err());
        let token = slot.lock().unwrap().clone().unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn legacy_begin_runs_without_the_ambient_request() {
        let descriptor = build(ActionDescriptor::builder("legacy").begin_end(
            |_: Arc<Reports>, _, callback| {
                let seen = ambient::current().map(|r| r.action).unwrap_or_default();
                let handle = interop::begin(
                    actionflow_core::PendingComputation::from_value(seen),
                    Some(callback),
                    None,
                );
                Ok(handle as Arc<dyn actionflow_core::AsyncResult>)
            },
            interop::end::<String>,
        ));

        let result = executor(None)
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert_eq!(result.ok().flatten(), Some(ActionValue::Text(String::new())));
    }

    #[tokio::test]
    async fn task_value_is_extracted() {
        let descriptor = build(
            ActionDescriptor::builder("show")
                .parameter(ParameterDescriptor::required("id"))
                .task(|_: Arc<Reports>, args: Arguments| async move {
                    let id: u32 = args.parse("id")?;
                    Ok::<_, ActionError>(ActionResult::json(json!({ "id": id })))
                }),
        );
        let parameters = Parameters::from([("id".to_string(), json!(9))]);

        let result = executor(None)
            .execute(&request(), &descriptor, controller(), &parameters)
            .await;

        assert_eq!(
            result.ok().flatten(),
            Some(ActionValue::Result(ActionResult::json(json!({ "id": 9 }))))
        );
    }

    #[tokio::test]
    async fn sync_action_sees_the_ambient_request() {
        let descriptor = build(ActionDescriptor::builder("whoami").sync(|_: &Reports, _| {
            Ok(ambient::current().map(|r| r.action).unwrap_or_default())
        }));

        let result = executor(None)
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert_eq!(result.ok().flatten(), Some(ActionValue::Text("whoami".into())));
        assert!(ambient::current().is_none());
    }

    #[tokio::test]
    async fn begin_end_action_completes_through_the_bridge() {
        let descriptor = build(ActionDescriptor::builder("legacy").begin_end(
            |_: Arc<Reports>, _, callback| {
                let handle = interop::begin(
                    actionflow_core::PendingComputation::from_value("from legacy".to_string()),
                    Some(callback),
                    None,
                );
                Ok(handle as Arc<dyn actionflow_core::AsyncResult>)
            },
            interop::end::<String>,
        ));

        let result = executor(None)
            .execute(&request(), &descriptor, controller(), &Parameters::new())
            .await;

        assert_eq!(result.ok().flatten(), Some(ActionValue::Text("from legacy".into())));
    }

    #[test]
    fn missing_required_parameter_is_a_binding_fault() {
        let descriptor = build(
            ActionDescriptor::builder("show")
                .parameter(ParameterDescriptor::required("id"))
                .sync(|_: &Reports, _| Ok(())),
        );

        let result = bind_arguments(&descriptor, &Parameters::new(), None);
        assert!(matches!(
            result,
            Err(ActionError::Binding { ref parameter, .. }) if parameter == "id"
        ));
    }

    #[test]
    fn optional_parameter_takes_its_default() {
        let descriptor = build(
            ActionDescriptor::builder("list")
                .parameter(ParameterDescriptor::optional("page", 1))
                .parameter(ParameterDescriptor::cancellation("token"))
                .sync(|_: &Reports, _| Ok(())),
        );
        let token = CancellationToken::new();

        let arguments = bind_arguments(&descriptor, &Parameters::new(), Some(&token));
        let Ok(arguments) = arguments else {
            unreachable!("optional parameters always bind");
        };
        assert_eq!(arguments.value("page"), Some(&json!(1)));
        assert!(arguments.cancellation_token().is_some());
    }
}

//! Stage sequencing of the orchestrator: authentication, authorization,
//! validation, binding, exception filters and result filters.

#![allow(clippy::unwrap_used)] // Tests can unwrap

mod common;

use actionflow_core::{ActionError, ActionResult, FilterSet, Principal, RequestContext};
use actionflow_runtime::{ActionInvoker, FilterRegistry, PipelineConfig};
use actionflow_testing::{
    Failure, Journal, RecordingActionFilter, RecordingAuthenticationFilter,
    RecordingAuthorizationFilter, RecordingExceptionFilter, RecordingResultExecutor,
    RecordingResultFilter, RejectingValidator,
};
use common::{harness, harness_with, request, shop_registry};
use std::sync::Arc;

#[tokio::test]
async fn unknown_action_returns_false_and_releases_the_controller() {
    let journal = Journal::new();
    let h = harness(&journal, FilterSet::new());

    assert!(!h.invoke("checkout").await.unwrap());

    assert!(journal.is_empty());
    assert_eq!((h.factory.created(), h.factory.released()), (1, 1));
}

#[tokio::test]
async fn unknown_controller_fails_before_any_stage() {
    let journal = Journal::new();
    let h = harness(
        &journal,
        FilterSet::new().with_exception(Arc::new(RecordingExceptionFilter::new("x", &journal))),
    );

    let result = h
        .invoker
        .invoke_action(Arc::new(RequestContext::new("warehouse")), "index")
        .await;

    assert!(matches!(result, Err(ActionError::ControllerNotFound(_))));
    assert!(journal.is_empty());
    assert_eq!(h.factory.released(), 0);
}

#[tokio::test]
async fn authentication_challenge_wins_over_the_short_circuit_result() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_authentication(Arc::new(
            RecordingAuthenticationFilter::new("a0", &journal)
                .short_circuit(ActionResult::unauthorized()),
        ))
        .with_authentication(Arc::new(
            RecordingAuthenticationFilter::new("a1", &journal)
                .challenge(ActionResult::redirect("/login")),
        ))
        .with_authorization(Arc::new(RecordingAuthorizationFilter::new("z", &journal)))
        .with_action(Arc::new(RecordingActionFilter::new("f0", &journal)));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());

    assert_eq!(
        journal.entries(),
        ["a0.authenticate", "a0.challenge", "a1.challenge", "result.execute"]
    );
    assert_eq!(h.executed(), [ActionResult::redirect("/login")]);
}

#[tokio::test]
async fn short_circuit_result_is_kept_without_a_challenge() {
    let journal = Journal::new();
    let filters = FilterSet::new().with_authentication(Arc::new(
        RecordingAuthenticationFilter::new("a0", &journal).short_circuit(ActionResult::status(401)),
    ));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());
    assert_eq!(h.executed(), [ActionResult::status(401)]);
}

#[tokio::test]
async fn authorization_denial_still_solicits_every_challenge() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_authentication(Arc::new(RecordingAuthenticationFilter::new("a0", &journal)))
        .with_authentication(Arc::new(RecordingAuthenticationFilter::new("a1", &journal)))
        .with_authorization(Arc::new(
            RecordingAuthorizationFilter::new("z0", &journal).deny(ActionResult::status(403)),
        ))
        .with_authorization(Arc::new(RecordingAuthorizationFilter::new("z1", &journal)));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());

    assert_eq!(
        journal.entries(),
        [
            "a0.authenticate",
            "a1.authenticate",
            "z0.authorize",
            "a0.challenge",
            "a1.challenge",
            "result.execute",
        ]
    );
    assert_eq!(h.executed(), [ActionResult::status(403)]);
}

#[tokio::test]
async fn authenticated_principal_is_applied_before_authorization() {
    let journal = Journal::new();
    let ada = Principal::new("ada").with_role("admin");
    let filters = FilterSet::new()
        .with_authentication(Arc::new(
            RecordingAuthenticationFilter::new("a0", &journal).sign_in(ada.clone()),
        ))
        .with_authorization(Arc::new(
            RecordingAuthorizationFilter::new("z0", &journal).require_role("admin"),
        ));
    let h = harness(&journal, filters);
    let request = request();

    assert!(h.invoker.invoke_action(Arc::clone(&request), "index").await.unwrap());

    assert_eq!(request.principal(), Some(ada));
    assert!(journal.contains("action"));
    assert_eq!(h.executed(), [ActionResult::content("welcome")]);
}

#[tokio::test]
async fn missing_role_is_denied() {
    let journal = Journal::new();
    let filters = FilterSet::new().with_authorization(Arc::new(
        RecordingAuthorizationFilter::new("z0", &journal).require_role("admin"),
    ));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());

    assert!(!journal.contains("action"));
    assert_eq!(h.executed(), [ActionResult::unauthorized()]);
}

#[tokio::test]
async fn challenge_runs_after_a_successful_chain() {
    let journal = Journal::new();
    let filters = FilterSet::new().with_authentication(Arc::new(
        RecordingAuthenticationFilter::new("a0", &journal)
            .challenge(ActionResult::content("welcome, stranger")),
    ));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());

    assert_eq!(
        journal.entries(),
        ["a0.authenticate", "action", "a0.challenge", "result.execute"]
    );
    assert_eq!(h.executed(), [ActionResult::content("welcome, stranger")]);
}

fn validated_invoker(journal: &Journal, config: PipelineConfig) -> ActionInvoker {
    let registry = Arc::new(shop_registry(journal));
    let filters = FilterSet::new()
        .with_exception(Arc::new(RecordingExceptionFilter::new("x", journal)));
    ActionInvoker::from_registry(registry, Arc::new(RecordingResultExecutor::new(journal)))
        .with_config(config)
        .with_filters(Arc::new(filters))
        .with_validator(Arc::new(RejectingValidator::new("debug", journal)))
        .build()
}

#[tokio::test]
async fn validation_failure_goes_to_exception_filters() {
    let journal = Journal::new();
    let invoker = validated_invoker(&journal, PipelineConfig::default());
    let request = Arc::new(RequestContext::new("shop").with_query_value("debug", true));

    let result = invoker.invoke_action(request, "index").await;

    assert!(matches!(result, Err(ActionError::Validation(_))));
    assert_eq!(journal.entries(), ["validate", "x.exception:validation"]);
}

#[tokio::test]
async fn validation_can_be_disabled() {
    let journal = Journal::new();
    let invoker = validated_invoker(
        &journal,
        PipelineConfig::default().with_validate_requests(false),
    );
    let request = Arc::new(RequestContext::new("shop").with_query_value("debug", true));

    assert!(invoker.invoke_action(request, "index").await.unwrap());
    assert!(!journal.contains("validate"));
}

#[tokio::test]
async fn binding_fault_can_be_handled_by_an_exception_filter() {
    let journal = Journal::new();
    let filters = FilterSet::new().with_exception(Arc::new(
        RecordingExceptionFilter::new("x", &journal).handle(ActionResult::status(400)),
    ));
    let h = harness(&journal, filters);

    assert!(h.invoke("price").await.unwrap());

    assert_eq!(journal.entries(), ["x.exception:binding", "result.execute"]);
    assert_eq!(h.executed(), [ActionResult::status(400)]);
}

#[tokio::test]
async fn every_exception_filter_runs_even_after_one_handles() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_exception(Arc::new(
            RecordingExceptionFilter::new("x0", &journal).handle(ActionResult::status(500)),
        ))
        .with_exception(Arc::new(RecordingExceptionFilter::new("x1", &journal)));
    let h = harness(&journal, filters);

    assert!(h.invoke("fail").await.unwrap());

    assert_eq!(
        journal.entries(),
        ["action", "x0.exception:action", "x1.exception:action", "result.execute"]
    );
    assert_eq!(h.executed(), [ActionResult::status(500)]);
}

#[tokio::test]
async fn host_abort_bypasses_exception_filters() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_action(Arc::new(
            RecordingActionFilter::new("f0", &journal).handle(ActionResult::status(500)),
        ))
        .with_exception(Arc::new(
            RecordingExceptionFilter::new("x", &journal).handle(ActionResult::status(500)),
        ));
    let h = harness(&journal, filters);

    let error = h.invoke("abort").await.unwrap_err();

    assert!(error.is_host_abort());
    assert_eq!(journal.entries(), ["f0.executing", "action", "f0.executed:empty"]);
    assert!(h.executed().is_empty());
    assert_eq!(h.factory.released(), 1);
}

#[tokio::test]
async fn host_abort_from_a_filter_bypasses_exception_filters() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_action(Arc::new(RecordingActionFilter::new("f0", &journal)))
        .with_action(Arc::new(
            RecordingActionFilter::new("f1", &journal).fail_executing(Failure::abort("redirect")),
        ))
        .with_exception(Arc::new(RecordingExceptionFilter::new("x", &journal)));
    let h = harness(&journal, filters);

    let error = h.invoke("index").await.unwrap_err();

    assert!(error.is_host_abort());
    assert_eq!(
        journal.entries(),
        ["f0.executing", "f1.executing", "f0.executed:empty"]
    );
}

#[tokio::test]
async fn result_filters_wrap_result_execution() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_result(Arc::new(RecordingResultFilter::new("r0", &journal)))
        .with_result(Arc::new(RecordingResultFilter::new("r1", &journal)));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());

    assert_eq!(
        journal.entries(),
        [
            "action",
            "r0.result_executing",
            "r1.result_executing",
            "result.execute",
            "r1.result_executed:result",
            "r0.result_executed:result",
        ]
    );
}

#[tokio::test]
async fn result_filter_can_cancel_execution() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_result(Arc::new(RecordingResultFilter::new("r0", &journal)))
        .with_result(Arc::new(RecordingResultFilter::new("r1", &journal).cancel()))
        .with_result(Arc::new(RecordingResultFilter::new("r2", &journal)));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());

    assert_eq!(
        journal.entries(),
        [
            "action",
            "r0.result_executing",
            "r1.result_executing",
            "r0.result_executed:canceled",
        ]
    );
    assert!(h.executed().is_empty());
}

#[tokio::test]
async fn result_filter_fault_is_offered_to_exception_filters() {
    let journal = Journal::new();
    let filters = FilterSet::new()
        .with_result(Arc::new(
            RecordingResultFilter::new("r0", &journal).fail_executed(Failure::fault("render")),
        ))
        .with_exception(Arc::new(
            RecordingExceptionFilter::new("x", &journal).handle(ActionResult::status(500)),
        ));
    let h = harness(&journal, filters);

    assert!(h.invoke("index").await.unwrap());

    assert_eq!(
        journal.entries(),
        [
            "action",
            "r0.result_executing",
            "result.execute",
            "r0.result_executed:result",
            "x.exception:action",
            "result.execute",
        ]
    );
    assert_eq!(
        h.executed(),
        [ActionResult::content("welcome"), ActionResult::status(500)]
    );
}

#[tokio::test]
async fn scoped_filters_compose_global_controller_action() {
    let journal = Journal::new();
    let provider = FilterRegistry::new()
        .with_action(
            "SHOP",
            "index",
            FilterSet::new().with_action(Arc::new(RecordingActionFilter::new("scoped", &journal))),
        )
        .with_controller(
            "shop",
            FilterSet::new()
                .with_action(Arc::new(RecordingActionFilter::new("controller", &journal))),
        )
        .with_global(
            FilterSet::new().with_action(Arc::new(RecordingActionFilter::new("global", &journal))),
        );
    let h = harness_with(&journal, Arc::new(provider), PipelineConfig::default());

    assert!(h.invoke("index").await.unwrap());

    assert_eq!(
        journal.entries(),
        [
            "global.executing",
            "controller.executing",
            "scoped.executing",
            "action",
            "scoped.executed:result",
            "controller.executed:result",
            "global.executed:result",
            "result.execute",
        ]
    );
}

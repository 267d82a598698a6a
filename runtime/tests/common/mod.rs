//! Shared fixture: a `shop` controller whose actions record into a journal.

#![allow(dead_code)]

use actionflow_core::pending::AsyncResult;
use actionflow_core::{
    ActionDescriptor, ActionError, ActionResult, Arguments, FilterProvider, FilterSet,
    ParameterDescriptor, PendingComputation, RequestContext,
};
use actionflow_runtime::{ActionInvoker, ControllerRegistry, PipelineConfig, interop};
use actionflow_testing::{CountingControllerFactory, Journal, RecordingResultExecutor};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub struct Shop {
    journal: Journal,
}

pub struct Harness {
    pub journal: Journal,
    pub results: Arc<RecordingResultExecutor>,
    pub factory: Arc<CountingControllerFactory>,
    pub invoker: ActionInvoker,
}

impl Harness {
    pub async fn invoke(&self, action: &str) -> Result<bool, ActionError> {
        self.invoker.invoke_action(request(), action).await
    }

    pub fn executed(&self) -> Vec<ActionResult> {
        self.results.executed()
    }
}

pub fn request() -> Arc<RequestContext> {
    Arc::new(RequestContext::new("shop"))
}

pub fn shop_registry(journal: &Journal) -> ControllerRegistry {
    let journal = journal.clone();
    let mut registry = ControllerRegistry::default();
    registry
        .register(
            "shop",
            move || Shop {
                journal: journal.clone(),
            },
            |c| {
                c.action(ActionDescriptor::builder("index").sync(|shop: &Shop, _| {
                    shop.journal.record("action");
                    Ok("welcome")
                }))
                .action(ActionDescriptor::builder("fail").sync(|shop: &Shop, _| {
                    shop.journal.record("action");
                    Err::<(), _>(ActionError::action(anyhow::anyhow!("out of stock")))
                }))
                .action(ActionDescriptor::builder("abort").sync(|shop: &Shop, _| {
                    shop.journal.record("action");
                    Err::<(), _>(ActionError::host_abort("redirected"))
                }))
                .action(
                    ActionDescriptor::builder("price")
                        .parameter(ParameterDescriptor::required("amount"))
                        .task(|shop: Arc<Shop>, args: Arguments| async move {
                            shop.journal.record("action");
                            let amount: u64 = args.parse("amount")?;
                            Ok::<_, ActionError>(ActionResult::json(json!({ "price": amount })))
                        }),
                )
                .action(
                    ActionDescriptor::builder("slow")
                        .parameter(ParameterDescriptor::cancellation("token"))
                        .task(|shop: Arc<Shop>, args: Arguments| async move {
                            shop.journal.record("action");
                            let token = args.cancellation_token().cloned().unwrap_or_default();
                            tokio::select! {
                                () = token.cancelled() => Err(ActionError::Canceled),
                                () = tokio::time::sleep(Duration::from_secs(60)) => Ok("finished"),
                            }
                        }),
                )
                .action(
                    ActionDescriptor::builder("quit")
                        .parameter(ParameterDescriptor::cancellation("token"))
                        .task(|shop: Arc<Shop>, _| async move {
                            shop.journal.record("action");
                            Err::<(), _>(ActionError::Canceled)
                        }),
                )
                .action(ActionDescriptor::builder("legacy").begin_end(
                    |shop: Arc<Shop>, _, callback| {
                        shop.journal.record("action");
                        let computation = PendingComputation::spawn(async {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            Ok("from legacy".to_string())
                        });
                        Ok(interop::begin(computation, Some(callback), None) as Arc<dyn AsyncResult>)
                    },
                    interop::end::<String>,
                ))
            },
        )
        .unwrap_or_else(|e| unreachable!("shop registers cleanly: {e}"));
    registry
}

pub fn harness(journal: &Journal, filters: FilterSet) -> Harness {
    harness_with(journal, Arc::new(filters), PipelineConfig::default())
}

pub fn harness_with(
    journal: &Journal,
    filters: Arc<dyn FilterProvider>,
    config: PipelineConfig,
) -> Harness {
    let registry = Arc::new(shop_registry(journal));
    let factory = Arc::new(CountingControllerFactory::new(registry.clone()));
    let results = Arc::new(RecordingResultExecutor::new(journal));
    let invoker = ActionInvoker::builder(factory.clone(), registry, results.clone())
        .with_filters(filters)
        .with_config(config)
        .build();

    Harness {
        journal: journal.clone(),
        results,
        factory,
        invoker,
    }
}

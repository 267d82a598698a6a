//! Prometheus metrics for the invocation pipeline.
//!
//! The orchestrator, executor and interop bridge record through the small
//! recorder structs below. Nothing is exported until a host installs a
//! recorder; [`MetricsRecorder`] installs the Prometheus one.
//!
//! # Example
//!
//! ```rust,no_run
//! use actionflow_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // Serve this from the host's /metrics endpoint
//! let scrape = recorder.render();
//! # drop(scrape);
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders its scrape text.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that is not installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test) this logs a
    /// warning and succeeds without a handle; metrics still flow to the
    /// installed recorder.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                    60.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this recorder did not install the exporter.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "actionflow_actions_invoked_total",
        "Total number of action invocations started"
    );
    describe_counter!(
        "actionflow_actions_not_found_total",
        "Total number of invocations naming an unknown action"
    );
    describe_counter!(
        "actionflow_actions_short_circuited_total",
        "Total number of invocations short-circuited by a filter, by stage"
    );
    describe_counter!(
        "actionflow_actions_faulted_total",
        "Total number of faults offered to exception filters, by whether one handled it"
    );
    describe_counter!(
        "actionflow_actions_timed_out_total",
        "Total number of asynchronous actions canceled by the pipeline timeout"
    );
    describe_histogram!(
        "actionflow_action_duration_seconds",
        "Time from invocation start to the executed result"
    );
    describe_counter!(
        "actionflow_interop_begin_total",
        "Total number of computations wrapped for begin/end callers"
    );
}

/// Stage at which a filter short-circuited the invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuitStage {
    /// An authentication filter supplied a result
    Authentication,
    /// An authorization filter supplied a result
    Authorization,
    /// An action filter's pre-hook supplied a result
    ActionFilter,
    /// A result filter canceled result execution
    ResultFilter,
}

impl ShortCircuitStage {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::ActionFilter => "action_filter",
            Self::ResultFilter => "result_filter",
        }
    }
}

/// Invocation metrics recorder.
pub struct InvocationMetrics;

impl InvocationMetrics {
    /// Record an invocation start.
    pub fn record_invoked() {
        counter!("actionflow_actions_invoked_total").increment(1);
    }

    /// Record an invocation naming an unknown action.
    pub fn record_not_found() {
        counter!("actionflow_actions_not_found_total").increment(1);
    }

    /// Record a short-circuit.
    pub fn record_short_circuit(stage: ShortCircuitStage) {
        counter!("actionflow_actions_short_circuited_total", "stage" => stage.as_str())
            .increment(1);
    }

    /// Record a fault offered to exception filters.
    pub fn record_fault(handled: bool) {
        let handled = if handled { "true" } else { "false" };
        counter!("actionflow_actions_faulted_total", "handled" => handled).increment(1);
    }

    /// Record a pipeline timeout.
    pub fn record_timeout() {
        counter!("actionflow_actions_timed_out_total").increment(1);
    }

    /// Record an invocation that executed a result.
    pub fn record_duration(duration: Duration) {
        histogram!("actionflow_action_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Interop bridge metrics recorder.
pub struct InteropMetrics;

impl InteropMetrics {
    /// Record a computation wrapped for a begin/end caller.
    pub fn record_begin(completed_synchronously: bool) {
        let completed_synchronously = if completed_synchronously { "true" } else { "false" };
        counter!(
            "actionflow_interop_begin_total",
            "completed_synchronously" => completed_synchronously
        )
        .increment(1);
    }
}

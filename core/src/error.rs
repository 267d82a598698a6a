//! Fault taxonomy for the action-invocation pipeline.
//!
//! Every layer of the pipeline reports failures through [`ActionError`].
//! Faults are moved between layers, never wrapped, so the value a caller
//! receives is the one originally raised.
//!
//! # Categories
//!
//! - **Binding**: a required input could not be satisfied
//! - **Validation**: request validation rejected the request
//! - **Action**: user code inside an action, filter or result failed
//! - **Timeout**: the pipeline's timer canceled an asynchronous action
//! - **Canceled**: the action observed a cancellation it did not get from the timer
//! - **Host abort**: a non-recoverable control transfer (e.g. a redirect)
//!   that every recovery layer must let through untouched

use std::time::Duration;
use thiserror::Error;

/// Errors raised while locating, filtering or executing an action.
#[derive(Error, Debug)]
pub enum ActionError {
    /// A parameter could not be bound from the request.
    #[error("parameter `{parameter}` of action `{action}` could not be bound: {reason}")]
    Binding {
        /// Action whose parameter failed
        action: String,
        /// Name of the parameter
        parameter: String,
        /// Human-readable reason
        reason: String,
    },

    /// Request validation rejected the incoming request.
    #[error("request validation failed: {0}")]
    Validation(String),

    /// A fault raised by user code (action body, filter hook, result execution).
    #[error(transparent)]
    Action(#[from] anyhow::Error),

    /// The pipeline's timer fired and canceled an asynchronous action.
    ///
    /// Distinct from [`ActionError::Canceled`]: this is only produced when the
    /// cancellation signal was triggered by the pipeline, not by the action.
    #[error("asynchronous action `{action}` timed out after {timeout:?}")]
    Timeout {
        /// Action that timed out
        action: String,
        /// Configured timeout that elapsed
        timeout: Duration,
    },

    /// The computation was canceled by something other than the pipeline timer.
    #[error("the operation was canceled")]
    Canceled,

    /// Host-initiated abort of the request (e.g. triggered by a redirect).
    ///
    /// Never offered to exception filters and never marked handled.
    #[error("request aborted by host: {reason}")]
    HostAbort {
        /// Why the host aborted
        reason: String,
    },

    /// Several faults observed by a single computation.
    #[error("{} faults occurred: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<ActionError>),

    /// No controller is registered under the requested name.
    #[error("controller `{0}` was not found")]
    ControllerNotFound(String),

    /// A descriptor was built with an unsupported shape.
    #[error("invalid action descriptor: {0}")]
    InvalidDescriptor(String),

    /// An asynchronous action produced a value of a type other than the declared one.
    #[error("action `{action}` did not produce its declared return type `{expected}`")]
    ReturnTypeMismatch {
        /// Action whose value could not be extracted
        action: String,
        /// Declared return type
        expected: &'static str,
    },

    /// The producer of a computation went away before completing it.
    #[error("computation was abandoned before it completed")]
    Abandoned,

    /// The outcome of a computation was already taken by another observer.
    #[error("computation outcome was already observed")]
    AlreadyObserved,

    /// A begin/end handle was passed to an "end" it did not come from.
    #[error("async result handle was not produced by the matching begin call")]
    InvalidHandle,
}

fn join_messages(errors: &[ActionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ActionError {
    /// Build a fault from any error raised by user code.
    pub fn action(error: impl Into<anyhow::Error>) -> Self {
        Self::Action(error.into())
    }

    /// Build a host abort signal.
    pub fn host_abort(reason: impl Into<String>) -> Self {
        Self::HostAbort {
            reason: reason.into(),
        }
    }

    /// Combine several faults.
    ///
    /// A single fault is returned as-is rather than wrapped.
    #[must_use]
    pub fn aggregate(mut errors: Vec<Self>) -> Self {
        if errors.len() == 1 {
            if let Some(only) = errors.pop() {
                return only;
            }
        }
        Self::Aggregate(errors)
    }

    /// Whether this is a host abort that must bypass every recovery layer.
    #[must_use]
    pub const fn is_host_abort(&self) -> bool {
        matches!(self, Self::HostAbort { .. })
    }

    /// Whether this is a pipeline-triggered timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this is a plain cancellation.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Short label used for metrics and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Binding { .. } => "binding",
            Self::Validation(_) => "validation",
            Self::Action(_) => "action",
            Self::Timeout { .. } => "timeout",
            Self::Canceled => "canceled",
            Self::HostAbort { .. } => "host_abort",
            Self::Aggregate(_) => "aggregate",
            Self::ControllerNotFound(_) => "controller_not_found",
            Self::InvalidDescriptor(_) => "invalid_descriptor",
            Self::ReturnTypeMismatch { .. } => "return_type_mismatch",
            Self::Abandoned => "abandoned",
            Self::AlreadyObserved => "already_observed",
            Self::InvalidHandle => "invalid_handle",
        }
    }
}

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, ActionError>;

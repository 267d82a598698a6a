//! Payloads handed to filter hooks.
//!
//! All contexts are created per invocation and live only as long as that
//! invocation's call tree. Each carries the request and the action
//! descriptor; the remaining fields are the slots filters read or write.

use crate::arguments::Parameters;
use crate::descriptor::{ActionDescriptor, ControllerInstance};
use crate::error::ActionError;
use crate::request::{Principal, RequestContext};
use crate::result::ActionResult;
use std::fmt;
use std::sync::Arc;

/// Payload of an action filter's pre-hook.
///
/// Setting `result` short-circuits: no further pre-hook runs and the action
/// is not invoked.
pub struct ActionExecutingContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action about to run
    pub descriptor: Arc<ActionDescriptor>,
    /// The controller instance
    pub controller: ControllerInstance,
    /// Bound parameters; edits are seen by the action
    pub parameters: Parameters,
    /// Short-circuit slot
    pub result: Option<ActionResult>,
}

impl ActionExecutingContext {
    /// Create a context with an empty short-circuit slot.
    #[must_use]
    pub const fn new(
        request: Arc<RequestContext>,
        descriptor: Arc<ActionDescriptor>,
        controller: ControllerInstance,
        parameters: Parameters,
    ) -> Self {
        Self {
            request,
            descriptor,
            controller,
            parameters,
            result: None,
        }
    }
}

impl fmt::Debug for ActionExecutingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutingContext")
            .field("action", &self.descriptor.name())
            .field("parameters", &self.parameters)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// Payload of an action filter's post-hook.
///
/// Going in, exactly one of `result`, `exception` or `canceled = true` is
/// meaningful. A filter handles a fault by calling
/// [`handle_exception`](Self::handle_exception) (or by clearing `exception`);
/// outer filters then see the supplied result and no fault.
#[derive(Debug)]
pub struct ActionExecutedContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action that ran (or was short-circuited)
    pub descriptor: Arc<ActionDescriptor>,
    /// Result produced by the action or supplied by a filter
    pub result: Option<ActionResult>,
    /// Fault raised by the action or a deeper filter
    pub exception: Option<ActionError>,
    /// Whether a filter handled `exception`
    pub exception_handled: bool,
    /// Whether a pre-hook short-circuited
    pub canceled: bool,
}

impl ActionExecutedContext {
    /// The action (or a short-circuit) produced `result`.
    #[must_use]
    pub const fn completed(
        request: Arc<RequestContext>,
        descriptor: Arc<ActionDescriptor>,
        result: ActionResult,
    ) -> Self {
        Self {
            request,
            descriptor,
            result: Some(result),
            exception: None,
            exception_handled: false,
            canceled: false,
        }
    }

    /// A pre-hook short-circuited with `result`.
    #[must_use]
    pub const fn short_circuited(
        request: Arc<RequestContext>,
        descriptor: Arc<ActionDescriptor>,
        result: ActionResult,
    ) -> Self {
        Self {
            request,
            descriptor,
            result: Some(result),
            exception: None,
            exception_handled: false,
            canceled: true,
        }
    }

    /// A deeper stage raised `exception`.
    #[must_use]
    pub const fn faulted(
        request: Arc<RequestContext>,
        descriptor: Arc<ActionDescriptor>,
        exception: ActionError,
    ) -> Self {
        Self {
            request,
            descriptor,
            result: None,
            exception: Some(exception),
            exception_handled: false,
            canceled: false,
        }
    }

    /// The host aborted the request; filters see neither a fault nor a cancellation.
    #[must_use]
    pub const fn aborted(request: Arc<RequestContext>, descriptor: Arc<ActionDescriptor>) -> Self {
        Self {
            request,
            descriptor,
            result: None,
            exception: None,
            exception_handled: false,
            canceled: false,
        }
    }

    /// Mark the fault handled and supply the result to execute instead.
    pub fn handle_exception(&mut self, result: ActionResult) {
        self.result = Some(result);
        self.exception_handled = true;
    }
}

/// Payload of an authentication filter.
#[derive(Debug)]
pub struct AuthenticationContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action being authenticated
    pub descriptor: Arc<ActionDescriptor>,
    /// Principal; replacing it updates the request after the stage
    pub principal: Option<Principal>,
    /// Short-circuit slot
    pub result: Option<ActionResult>,
}

/// Payload of an authentication filter's challenge hook.
///
/// `result` starts as the result about to be executed; a filter may replace
/// it (e.g. to add a challenge). A non-empty value wins over the original.
#[derive(Debug)]
pub struct AuthenticationChallengeContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action
    pub descriptor: Arc<ActionDescriptor>,
    /// Result to execute
    pub result: Option<ActionResult>,
}

/// Payload of an authorization filter.
#[derive(Debug)]
pub struct AuthorizationContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action being authorized
    pub descriptor: Arc<ActionDescriptor>,
    /// Short-circuit slot
    pub result: Option<ActionResult>,
}

/// Payload of an exception filter.
#[derive(Debug)]
pub struct ExceptionContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action whose invocation faulted
    pub descriptor: Arc<ActionDescriptor>,
    exception: ActionError,
    /// Whether a filter handled the fault
    pub exception_handled: bool,
    /// Result to execute when handled
    pub result: Option<ActionResult>,
}

impl ExceptionContext {
    /// Create a context for `exception`.
    #[must_use]
    pub const fn new(
        request: Arc<RequestContext>,
        descriptor: Arc<ActionDescriptor>,
        exception: ActionError,
    ) -> Self {
        Self {
            request,
            descriptor,
            exception,
            exception_handled: false,
            result: None,
        }
    }

    /// The fault.
    #[must_use]
    pub const fn exception(&self) -> &ActionError {
        &self.exception
    }

    /// Mark the fault handled and supply the result to execute.
    pub fn handle(&mut self, result: ActionResult) {
        self.result = Some(result);
        self.exception_handled = true;
    }

    /// Take the fault back out, e.g. to re-raise it.
    #[must_use]
    pub fn into_exception(self) -> ActionError {
        self.exception
    }
}

/// Payload of a result filter's pre-hook.
///
/// Setting `cancel` stops deeper result filters and the result execution.
#[derive(Debug)]
pub struct ResultExecutingContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action whose result is executing
    pub descriptor: Arc<ActionDescriptor>,
    /// Result about to be executed
    pub result: ActionResult,
    /// Cancellation slot
    pub cancel: bool,
}

impl ResultExecutingContext {
    /// Create a context for executing `result`.
    #[must_use]
    pub const fn new(
        request: Arc<RequestContext>,
        descriptor: Arc<ActionDescriptor>,
        result: ActionResult,
    ) -> Self {
        Self {
            request,
            descriptor,
            result,
            cancel: false,
        }
    }
}

/// Payload of a result filter's post-hook.
///
/// A fault raised by a deeper stage is observable through
/// [`exception`](Self::exception) but cannot be cleared: result filters do
/// not recover faults.
#[derive(Debug)]
pub struct ResultExecutedContext {
    /// The request
    pub request: Arc<RequestContext>,
    /// The action
    pub descriptor: Arc<ActionDescriptor>,
    /// Result that was (or would have been) executed
    pub result: ActionResult,
    /// Whether a pre-hook canceled execution
    pub canceled: bool,
    exception: Option<ActionError>,
}

impl ResultExecutedContext {
    /// Create a context describing how result execution ended.
    #[must_use]
    pub const fn new(
        request: Arc<RequestContext>,
        descriptor: Arc<ActionDescriptor>,
        result: ActionResult,
        canceled: bool,
        exception: Option<ActionError>,
    ) -> Self {
        Self {
            request,
            descriptor,
            result,
            canceled,
            exception,
        }
    }

    /// Fault raised by a deeper stage, if any.
    #[must_use]
    pub const fn exception(&self) -> Option<&ActionError> {
        self.exception.as_ref()
    }

    /// Take the fault back out.
    #[must_use]
    pub fn into_exception(self) -> Option<ActionError> {
        self.exception
    }
}

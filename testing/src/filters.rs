//! Filters that record every hook into a [`Journal`].
//!
//! Entry formats, with `n` the filter's name:
//!
//! | Filter | Entries |
//! |---|---|
//! | action | `n.executing`, `n.executed:<state>` |
//! | authentication | `n.authenticate`, `n.challenge` |
//! | authorization | `n.authorize` |
//! | exception | `n.exception:<kind>` |
//! | result | `n.result_executing`, `n.result_executed:<state>` |
//!
//! `<state>` is one of `result`, `canceled`, `fault` or `empty` (no result,
//! no fault: what post-hooks see while a host abort unwinds).

use crate::journal::Journal;
use actionflow_core::{
    ActionError, ActionExecutedContext, ActionExecutingContext, ActionFilter, ActionResult,
    AuthenticationChallengeContext, AuthenticationContext, AuthenticationFilter,
    AuthorizationContext, AuthorizationFilter, ExceptionContext, ExceptionFilter, Principal,
    ResultExecutedContext, ResultExecutingContext, ResultFilter,
};
use async_trait::async_trait;

/// A failure a fake raises on demand.
///
/// [`ActionError`] is not `Clone`, so fakes keep the recipe and build a fresh
/// error every time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// An [`ActionError::Action`] carrying the message
    Fault(String),
    /// An [`ActionError::HostAbort`] carrying the reason
    Abort(String),
}

impl Failure {
    /// An application fault.
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    /// A host abort.
    #[must_use]
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::Abort(reason.into())
    }

    /// Build the error.
    #[must_use]
    pub fn to_error(&self) -> ActionError {
        match self {
            Self::Fault(message) => ActionError::action(anyhow::anyhow!(message.clone())),
            Self::Abort(reason) => ActionError::host_abort(reason.clone()),
        }
    }
}

fn executed_state(ctx: &ActionExecutedContext) -> &'static str {
    if ctx.exception.is_some() {
        "fault"
    } else if ctx.canceled {
        "canceled"
    } else if ctx.result.is_some() {
        "result"
    } else {
        "empty"
    }
}

/// Action filter recording both hooks.
#[derive(Debug, Clone)]
pub struct RecordingActionFilter {
    name: String,
    journal: Journal,
    short_circuit: Option<ActionResult>,
    fail_executing: Option<Failure>,
    fail_executed: Option<Failure>,
    handle: Option<ActionResult>,
}

impl RecordingActionFilter {
    /// A filter that records and otherwise does nothing.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            short_circuit: None,
            fail_executing: None,
            fail_executed: None,
            handle: None,
        }
    }

    /// Short-circuit from the pre-hook with `result`.
    #[must_use]
    pub fn short_circuit(mut self, result: ActionResult) -> Self {
        self.short_circuit = Some(result);
        self
    }

    /// Raise `failure` from the pre-hook.
    #[must_use]
    pub fn fail_executing(mut self, failure: Failure) -> Self {
        self.fail_executing = Some(failure);
        self
    }

    /// Raise `failure` from the post-hook.
    #[must_use]
    pub fn fail_executed(mut self, failure: Failure) -> Self {
        self.fail_executed = Some(failure);
        self
    }

    /// Handle any fault seen by the post-hook, substituting `result`.
    #[must_use]
    pub fn handle(mut self, result: ActionResult) -> Self {
        self.handle = Some(result);
        self
    }
}

#[async_trait]
impl ActionFilter for RecordingActionFilter {
    async fn on_action_executing(&self, ctx: &mut ActionExecutingContext) -> Result<(), ActionError> {
        self.journal.record(format!("{}.executing", self.name));
        if let Some(failure) = &self.fail_executing {
            return Err(failure.to_error());
        }
        if let Some(result) = &self.short_circuit {
            ctx.result = Some(result.clone());
        }
        Ok(())
    }

    async fn on_action_executed(&self, ctx: &mut ActionExecutedContext) -> Result<(), ActionError> {
        self.journal
            .record(format!("{}.executed:{}", self.name, executed_state(ctx)));
        if let Some(failure) = &self.fail_executed {
            return Err(failure.to_error());
        }
        if let (Some(result), Some(_)) = (&self.handle, &ctx.exception) {
            ctx.handle_exception(result.clone());
        }
        Ok(())
    }
}

/// Authentication filter recording both hooks.
#[derive(Debug, Clone)]
pub struct RecordingAuthenticationFilter {
    name: String,
    journal: Journal,
    principal: Option<Principal>,
    short_circuit: Option<ActionResult>,
    challenge: Option<ActionResult>,
}

impl RecordingAuthenticationFilter {
    /// A filter that records and otherwise does nothing.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            principal: None,
            short_circuit: None,
            challenge: None,
        }
    }

    /// Replace the request's principal.
    #[must_use]
    pub fn sign_in(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Short-circuit authentication with `result`.
    #[must_use]
    pub fn short_circuit(mut self, result: ActionResult) -> Self {
        self.short_circuit = Some(result);
        self
    }

    /// Replace the outgoing result with `result` during the challenge.
    #[must_use]
    pub fn challenge(mut self, result: ActionResult) -> Self {
        self.challenge = Some(result);
        self
    }
}

#[async_trait]
impl AuthenticationFilter for RecordingAuthenticationFilter {
    async fn on_authentication(&self, ctx: &mut AuthenticationContext) -> Result<(), ActionError> {
        self.journal.record(format!("{}.authenticate", self.name));
        if let Some(principal) = &self.principal {
            ctx.principal = Some(principal.clone());
        }
        if let Some(result) = &self.short_circuit {
            ctx.result = Some(result.clone());
        }
        Ok(())
    }

    async fn on_authentication_challenge(
        &self,
        ctx: &mut AuthenticationChallengeContext,
    ) -> Result<(), ActionError> {
        self.journal.record(format!("{}.challenge", self.name));
        if let Some(result) = &self.challenge {
            ctx.result = Some(result.clone());
        }
        Ok(())
    }
}

/// Authorization filter that records and optionally denies.
#[derive(Debug, Clone)]
pub struct RecordingAuthorizationFilter {
    name: String,
    journal: Journal,
    deny: Option<ActionResult>,
    require_role: Option<String>,
}

impl RecordingAuthorizationFilter {
    /// A filter that records and allows everything.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            deny: None,
            require_role: None,
        }
    }

    /// Always deny with `result`.
    #[must_use]
    pub fn deny(mut self, result: ActionResult) -> Self {
        self.deny = Some(result);
        self
    }

    /// Deny with `401` unless the request's principal is in `role`.
    #[must_use]
    pub fn require_role(mut self, role: impl Into<String>) -> Self {
        self.require_role = Some(role.into());
        self
    }
}

#[async_trait]
impl AuthorizationFilter for RecordingAuthorizationFilter {
    async fn on_authorization(&self, ctx: &mut AuthorizationContext) -> Result<(), ActionError> {
        self.journal.record(format!("{}.authorize", self.name));
        if let Some(result) = &self.deny {
            ctx.result = Some(result.clone());
        } else if let Some(role) = &self.require_role {
            let allowed = ctx
                .request
                .principal()
                .is_some_and(|principal| principal.is_in_role(role));
            if !allowed {
                ctx.result = Some(ActionResult::unauthorized());
            }
        }
        Ok(())
    }
}

/// Exception filter that records the fault kind and optionally handles it.
#[derive(Debug, Clone)]
pub struct RecordingExceptionFilter {
    name: String,
    journal: Journal,
    handle: Option<ActionResult>,
}

impl RecordingExceptionFilter {
    /// A filter that records and leaves the fault unhandled.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            handle: None,
        }
    }

    /// Handle the fault, substituting `result`.
    #[must_use]
    pub fn handle(mut self, result: ActionResult) -> Self {
        self.handle = Some(result);
        self
    }
}

#[async_trait]
impl ExceptionFilter for RecordingExceptionFilter {
    async fn on_exception(&self, ctx: &mut ExceptionContext) -> Result<(), ActionError> {
        self.journal
            .record(format!("{}.exception:{}", self.name, ctx.exception().kind()));
        if let Some(result) = &self.handle {
            ctx.handle(result.clone());
        }
        Ok(())
    }
}

/// Result filter recording both hooks.
#[derive(Debug, Clone)]
pub struct RecordingResultFilter {
    name: String,
    journal: Journal,
    cancel: bool,
    fail_executed: Option<Failure>,
}

impl RecordingResultFilter {
    /// A filter that records and otherwise does nothing.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            cancel: false,
            fail_executed: None,
        }
    }

    /// Cancel result execution from the pre-hook.
    #[must_use]
    pub const fn cancel(mut self) -> Self {
        self.cancel = true;
        self
    }

    /// Raise `failure` from the post-hook.
    #[must_use]
    pub fn fail_executed(mut self, failure: Failure) -> Self {
        self.fail_executed = Some(failure);
        self
    }
}

#[async_trait]
impl ResultFilter for RecordingResultFilter {
    async fn on_result_executing(&self, ctx: &mut ResultExecutingContext) -> Result<(), ActionError> {
        self.journal.record(format!("{}.result_executing", self.name));
        if self.cancel {
            ctx.cancel = true;
        }
        Ok(())
    }

    async fn on_result_executed(&self, ctx: &mut ResultExecutedContext) -> Result<(), ActionError> {
        let state = if ctx.exception().is_some() {
            "fault"
        } else if ctx.canceled {
            "canceled"
        } else {
            "result"
        };
        self.journal
            .record(format!("{}.result_executed:{state}", self.name));
        self.fail_executed.as_ref().map_or(Ok(()), |f| Err(f.to_error()))
    }
}

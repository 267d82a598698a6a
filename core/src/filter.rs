//! Filter traits and the per-invocation filter set.
//!
//! Every hook is asynchronous and may fail. Hooks have no-op defaults so a
//! filter only implements the stages it cares about. The pipeline treats
//! filter instances as opaque; a stateful filter synchronizes itself.

use crate::context::{
    ActionExecutedContext, ActionExecutingContext, AuthenticationChallengeContext,
    AuthenticationContext, AuthorizationContext, ExceptionContext, ResultExecutedContext,
    ResultExecutingContext,
};
use crate::contracts::FilterProvider;
use crate::descriptor::ActionDescriptor;
use crate::error::ActionError;
use crate::request::RequestContext;
use async_trait::async_trait;
use smallvec::SmallVec;
use std::sync::Arc;

/// Runs before and after the action method.
#[async_trait]
pub trait ActionFilter: Send + Sync {
    /// Called before the action; set `ctx.result` to short-circuit.
    async fn on_action_executing(&self, _ctx: &mut ActionExecutingContext) -> Result<(), ActionError> {
        Ok(())
    }

    /// Called after the action (or a deeper short-circuit or fault).
    async fn on_action_executed(&self, _ctx: &mut ActionExecutedContext) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Establishes the principal and contributes authentication challenges.
#[async_trait]
pub trait AuthenticationFilter: Send + Sync {
    /// Authenticate the request; set `ctx.result` to short-circuit.
    async fn on_authentication(&self, _ctx: &mut AuthenticationContext) -> Result<(), ActionError> {
        Ok(())
    }

    /// Contribute to the result about to be executed.
    async fn on_authentication_challenge(
        &self,
        _ctx: &mut AuthenticationChallengeContext,
    ) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Decides whether the request may run the action.
#[async_trait]
pub trait AuthorizationFilter: Send + Sync {
    /// Authorize the request; set `ctx.result` to short-circuit.
    async fn on_authorization(&self, ctx: &mut AuthorizationContext) -> Result<(), ActionError>;
}

/// Gets first refusal on faults raised by the invocation.
#[async_trait]
pub trait ExceptionFilter: Send + Sync {
    /// Observe the fault; call `ctx.handle(..)` to recover with a result.
    async fn on_exception(&self, ctx: &mut ExceptionContext) -> Result<(), ActionError>;
}

/// Runs around result execution.
#[async_trait]
pub trait ResultFilter: Send + Sync {
    /// Called before the result executes; set `ctx.cancel` to skip it.
    async fn on_result_executing(&self, _ctx: &mut ResultExecutingContext) -> Result<(), ActionError> {
        Ok(())
    }

    /// Called after the result executed (or was canceled, or faulted).
    async fn on_result_executed(&self, _ctx: &mut ResultExecutedContext) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Inline capacity for filter lists; most actions carry only a handful.
type Filters<F> = SmallVec<[Arc<F>; 4]>;

/// The filters that apply to one action invocation.
///
/// Order within each sequence is exactly as supplied and is never re-sorted.
#[derive(Clone, Default)]
pub struct FilterSet {
    /// Authentication filters
    pub authentication: Filters<dyn AuthenticationFilter>,
    /// Authorization filters
    pub authorization: Filters<dyn AuthorizationFilter>,
    /// Action filters
    pub action: Filters<dyn ActionFilter>,
    /// Exception filters
    pub exception: Filters<dyn ExceptionFilter>,
    /// Result filters
    pub result: Filters<dyn ResultFilter>,
}

impl FilterSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an authentication filter.
    #[must_use]
    pub fn with_authentication(mut self, filter: Arc<dyn AuthenticationFilter>) -> Self {
        self.authentication.push(filter);
        self
    }

    /// Append an authorization filter.
    #[must_use]
    pub fn with_authorization(mut self, filter: Arc<dyn AuthorizationFilter>) -> Self {
        self.authorization.push(filter);
        self
    }

    /// Append an action filter.
    #[must_use]
    pub fn with_action(mut self, filter: Arc<dyn ActionFilter>) -> Self {
        self.action.push(filter);
        self
    }

    /// Append an exception filter.
    #[must_use]
    pub fn with_exception(mut self, filter: Arc<dyn ExceptionFilter>) -> Self {
        self.exception.push(filter);
        self
    }

    /// Append a result filter.
    #[must_use]
    pub fn with_result(mut self, filter: Arc<dyn ResultFilter>) -> Self {
        self.result.push(filter);
        self
    }

    /// Append every sequence of `other` after this set's.
    pub fn extend(&mut self, other: Self) {
        self.authentication.extend(other.authentication);
        self.authorization.extend(other.authorization);
        self.action.extend(other.action);
        self.exception.extend(other.exception);
        self.result.extend(other.result);
    }

    /// Total number of filters across all sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authentication.len()
            + self.authorization.len()
            + self.action.len()
            + self.exception.len()
            + self.result.len()
    }

    /// Whether the set holds no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSet")
            .field("authentication", &self.authentication.len())
            .field("authorization", &self.authorization.len())
            .field("action", &self.action.len())
            .field("exception", &self.exception.len())
            .field("result", &self.result.len())
            .finish()
    }
}

/// A fixed set applies to every action.
impl FilterProvider for FilterSet {
    fn get_filters(&self, _request: &RequestContext, _action: &ActionDescriptor) -> FilterSet {
        self.clone()
    }
}

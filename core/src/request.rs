//! Per-request state shared by every stage of one invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Identity name
    pub name: String,
    /// Roles granted to the identity
    pub roles: Vec<String>,
}

impl Principal {
    /// Create a principal without roles.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    /// Add a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Whether the principal holds the given role (case-insensitive).
    #[must_use]
    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Context for one request flowing through the pipeline.
///
/// Created per invocation and shared (behind an `Arc`) with every filter
/// context. Route and query values are immutable once the request enters the
/// pipeline; only the principal can change, when an authentication filter
/// replaces it.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    started_at: DateTime<Utc>,
    controller_name: String,
    route_values: HashMap<String, Value>,
    query: HashMap<String, Value>,
    principal: RwLock<Option<Principal>>,
}

impl RequestContext {
    /// Create a request routed to the given controller.
    #[must_use]
    pub fn new(controller_name: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started_at: Utc::now(),
            controller_name: controller_name.into(),
            route_values: HashMap::new(),
            query: HashMap::new(),
            principal: RwLock::new(None),
        }
    }

    /// Add a route value.
    #[must_use]
    pub fn with_route_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.route_values.insert(name.into(), value.into());
        self
    }

    /// Add a query-string value.
    #[must_use]
    pub fn with_query_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Attach an initial principal.
    #[must_use]
    pub fn with_principal(self, principal: Principal) -> Self {
        self.set_principal(Some(principal));
        self
    }

    /// Unique id of this request.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// When the request entered the pipeline.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Name of the controller the request was routed to.
    #[must_use]
    pub fn controller_name(&self) -> &str {
        &self.controller_name
    }

    /// Route value by name.
    #[must_use]
    pub fn route_value(&self, name: &str) -> Option<&Value> {
        self.route_values.get(name)
    }

    /// Query-string value by name.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&Value> {
        self.query.get(name)
    }

    /// Look a value up in route values first, then the query string.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.route_value(name).or_else(|| self.query_value(name))
    }

    /// Current principal, if any.
    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.principal
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the principal.
    pub fn set_principal(&self, principal: Option<Principal>) {
        *self
            .principal
            .write()
            .unwrap_or_else(PoisonError::into_inner) = principal;
    }
}

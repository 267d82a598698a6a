//! Action results and the values actions produce.
//!
//! An [`ActionResult`] describes the response an action wants rendered. The
//! pipeline never interprets it; rendering belongs to the
//! [`ResultExecutor`](crate::contracts::ResultExecutor) collaborator.
//!
//! Actions return a typed value. [`ActionReturn`] is the
//! capability every such return type implements so the pipeline can turn the
//! completed value into an [`ActionValue`] without inspecting its type.

use serde::Serialize;
use serde_json::Value;

/// The response an action (or a short-circuiting filter) asks to be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionResult {
    /// Nothing is written to the response.
    Empty,

    /// A textual body.
    Content {
        /// Response body
        body: String,
        /// Optional content type (e.g. `text/plain`)
        content_type: Option<String>,
    },

    /// A JSON body.
    Json {
        /// Serialized payload
        body: Value,
    },

    /// A bare status code.
    Status {
        /// HTTP status code
        code: u16,
        /// Optional status description
        description: Option<String>,
    },

    /// A redirect to another location.
    Redirect {
        /// Target location
        location: String,
        /// Whether the redirect is permanent (301) or temporary (302)
        permanent: bool,
    },
}

impl ActionResult {
    /// Plain text content.
    #[must_use]
    pub fn content(body: impl Into<String>) -> Self {
        Self::Content {
            body: body.into(),
            content_type: None,
        }
    }

    /// JSON content.
    #[must_use]
    pub const fn json(body: Value) -> Self {
        Self::Json { body }
    }

    /// A status code without a body.
    #[must_use]
    pub const fn status(code: u16) -> Self {
        Self::Status {
            code,
            description: None,
        }
    }

    /// `401 Unauthorized`, the result authorization filters usually short-circuit with.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Status {
            code: 401,
            description: Some("Unauthorized".to_string()),
        }
    }

    /// Temporary redirect.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            permanent: false,
        }
    }

    /// Convert the value an action produced into the result to execute.
    ///
    /// An absent value becomes [`ActionResult::Empty`].
    #[must_use]
    pub fn from_value(value: Option<ActionValue>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// A value produced by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionValue {
    /// The action produced a ready-made result.
    Result(ActionResult),
    /// The action produced text, rendered as content.
    Text(String),
    /// The action produced structured data, rendered as JSON.
    Json(Value),
}

impl From<ActionValue> for ActionResult {
    fn from(value: ActionValue) -> Self {
        match value {
            ActionValue::Result(result) => result,
            ActionValue::Text(body) => Self::content(body),
            ActionValue::Json(body) => Self::json(body),
        }
    }
}

/// Capability implemented by every type an action may return.
///
/// Types carrying no value (such as `()`) set `CARRIES_VALUE` to `false`; the
/// extraction registry then yields `None` without calling `extract_value`.
pub trait ActionReturn: Send + 'static {
    /// Whether the type carries a production value at all.
    const CARRIES_VALUE: bool = true;

    /// Extract the production value.
    fn extract_value(self) -> Option<ActionValue>;
}

impl ActionReturn for () {
    const CARRIES_VALUE: bool = false;

    fn extract_value(self) -> Option<ActionValue> {
        None
    }
}

impl ActionReturn for String {
    fn extract_value(self) -> Option<ActionValue> {
        Some(ActionValue::Text(self))
    }
}

impl ActionReturn for &'static str {
    fn extract_value(self) -> Option<ActionValue> {
        Some(ActionValue::Text(self.to_string()))
    }
}

impl ActionReturn for Value {
    fn extract_value(self) -> Option<ActionValue> {
        Some(ActionValue::Json(self))
    }
}

impl ActionReturn for ActionResult {
    fn extract_value(self) -> Option<ActionValue> {
        Some(ActionValue::Result(self))
    }
}

impl ActionReturn for ActionValue {
    fn extract_value(self) -> Option<ActionValue> {
        Some(self)
    }
}

impl<T: ActionReturn> ActionReturn for Option<T> {
    const CARRIES_VALUE: bool = T::CARRIES_VALUE;

    fn extract_value(self) -> Option<ActionValue> {
        self.and_then(ActionReturn::extract_value)
    }
}

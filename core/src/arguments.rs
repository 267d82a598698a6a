//! Bound parameters and the positional arguments handed to an action method.

use crate::error::ActionError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Name → value mapping produced by parameter binding.
///
/// Action filters may edit it before the action runs.
pub type Parameters = HashMap<String, Value>;

/// One positional argument.
#[derive(Debug, Clone)]
pub enum Argument {
    /// A bound value
    Value(Value),
    /// The cancellation signal injected by the executor
    Cancellation(CancellationToken),
}

/// Arguments in the order the action declares its parameters.
#[derive(Debug, Clone)]
pub struct Arguments {
    action: String,
    entries: Vec<(String, Argument)>,
}

impl Arguments {
    /// Empty argument list for the given action.
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            entries: Vec::new(),
        }
    }

    /// Append the next positional argument.
    pub fn push(&mut self, name: impl Into<String>, argument: Argument) {
        self.entries.push((name.into(), argument));
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Argument by parameter name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, argument)| argument)
    }

    /// Argument by position.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Argument> {
        self.entries.get(index).map(|(_, argument)| argument)
    }

    /// Raw value of a value argument.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name) {
            Some(Argument::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Deserialize a value argument into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Binding`] if the argument is missing or does not
    /// deserialize into `T`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, ActionError> {
        let value = self.value(name).ok_or_else(|| ActionError::Binding {
            action: self.action.clone(),
            parameter: name.to_string(),
            reason: "no value was supplied".to_string(),
        })?;

        serde_json::from_value(value.clone()).map_err(|e| ActionError::Binding {
            action: self.action.clone(),
            parameter: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// The injected cancellation signal, if the action declares one.
    #[must_use]
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.entries.iter().find_map(|(_, argument)| match argument {
            Argument::Cancellation(token) => Some(token),
            Argument::Value(_) => None,
        })
    }

    /// Iterate over `(name, argument)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), a))
    }
}

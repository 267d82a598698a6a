//! Result-extraction registry.
//!
//! Maps the declared return type of a task-based action to the function that
//! pulls its production value out of the completed computation. Entries are
//! created on first use and never evicted. Concurrent population is safe:
//! the first writer wins and later writers adopt its entry.

use actionflow_core::descriptor::{ExtractFn, ReturnType};
use actionflow_core::{ActionError, ActionValue};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Extracts the production value of one declared return type.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    type_name: &'static str,
    extract: Option<ExtractFn>,
}

impl Extractor {
    fn for_type(returns: &ReturnType) -> Self {
        Self {
            type_name: returns.type_name(),
            extract: returns.carries_value().then(|| returns.extract_fn()),
        }
    }

    /// Whether the declared type carries a value at all.
    #[must_use]
    pub const fn carries_value(&self) -> bool {
        self.extract.is_some()
    }

    /// Extract the value of a successfully completed computation.
    ///
    /// Types that carry no value always yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::ReturnTypeMismatch`] if `value` is not of the
    /// declared type.
    pub fn extract(
        &self,
        action: &str,
        value: Box<dyn Any + Send>,
    ) -> Result<Option<ActionValue>, ActionError> {
        let Some(extract) = self.extract else {
            return Ok(None);
        };
        extract(value).map_err(|_| ActionError::ReturnTypeMismatch {
            action: action.to_string(),
            expected: self.type_name,
        })
    }
}

/// Memoized extractors keyed by declared return type.
#[derive(Debug, Default)]
pub struct ExtractorRegistry {
    extractors: RwLock<HashMap<TypeId, Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor for `returns`, creating it on first use.
    pub fn get(&self, returns: &ReturnType) -> Extractor {
        let key = returns.type_id();
        if let Some(extractor) = self
            .extractors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return *extractor;
        }

        let candidate = Extractor::for_type(returns);
        let mut extractors = self
            .extractors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *extractors.entry(key).or_insert(candidate)
    }

    /// Number of memoized return types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extractors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was memoized yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! In-memory collaborators.

use crate::filters::Failure;
use crate::journal::Journal;
use actionflow_core::{
    ActionDescriptor, ActionError, ActionResult, ControllerFactory, ControllerInstance,
    RequestContext, RequestValidator, ResultExecutor,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Result executor that remembers every result it was asked to execute.
///
/// Each execution also records `result.execute` in the journal, so tests can
/// place it among filter hooks.
#[derive(Debug, Default)]
pub struct RecordingResultExecutor {
    journal: Journal,
    executed: Mutex<Vec<ActionResult>>,
    failure: Option<Failure>,
}

impl RecordingResultExecutor {
    /// Create an executor recording into `journal`
    #[must_use]
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            executed: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    /// Raise `failure` from every execution (after recording it)
    #[must_use]
    pub fn failing(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Results executed so far, oldest first
    #[must_use]
    pub fn executed(&self) -> Vec<ActionResult> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ResultExecutor for RecordingResultExecutor {
    async fn execute(
        &self,
        _request: &RequestContext,
        _action: &ActionDescriptor,
        result: &ActionResult,
    ) -> Result<(), ActionError> {
        self.journal.record("result.execute");
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
        self.failure.as_ref().map_or(Ok(()), |f| Err(f.to_error()))
    }
}

/// Wraps a controller factory and counts creations and releases.
pub struct CountingControllerFactory {
    inner: Arc<dyn ControllerFactory>,
    created: AtomicUsize,
    released: AtomicUsize,
}

impl std::fmt::Debug for CountingControllerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingControllerFactory")
            .field("created", &self.created())
            .field("released", &self.released())
            .finish_non_exhaustive()
    }
}

impl CountingControllerFactory {
    /// Count calls made through to `inner`
    #[must_use]
    pub fn new(inner: Arc<dyn ControllerFactory>) -> Self {
        Self {
            inner,
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Controllers created so far
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Controllers released so far
    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl ControllerFactory for CountingControllerFactory {
    fn create_controller(&self, request: &RequestContext) -> Result<ControllerInstance, ActionError> {
        let controller = self.inner.create_controller(request)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(controller)
    }

    fn release_controller(&self, controller: ControllerInstance) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release_controller(controller);
    }
}

/// Validator that rejects requests carrying a given query key.
#[derive(Debug, Clone)]
pub struct RejectingValidator {
    journal: Journal,
    key: String,
}

impl RejectingValidator {
    /// Reject any request whose query or route values contain `key`
    #[must_use]
    pub fn new(key: impl Into<String>, journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            key: key.into(),
        }
    }
}

impl RequestValidator for RejectingValidator {
    fn validate(&self, request: &RequestContext) -> Result<(), ActionError> {
        self.journal.record("validate");
        if request.value(&self.key).is_some() {
            return Err(ActionError::Validation(format!(
                "`{}` is not allowed",
                self.key
            )));
        }
        Ok(())
    }
}

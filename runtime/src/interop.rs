//! Bridge between [`PendingComputation`] and the begin/end calling convention.
//!
//! - [`begin`] / [`end`] expose a computation to callers that expect a
//!   callback and a blocking "end" call.
//! - [`from_begin_end`] turns a legacy begin/end pair into a computation that
//!   async code can await.
//!
//! Bridging in both directions preserves the success value, the original
//! fault and the cancellation state.
//!
//! # Example
//!
//! ```
//! use actionflow_core::{ActionError, AsyncResult, PendingComputation};
//! use actionflow_runtime::interop;
//!
//! let computation = PendingComputation::from_value(7_u32);
//! let handle = interop::begin(computation, None, None);
//! assert!(handle.completed_synchronously());
//!
//! let value: Result<u32, ActionError> = interop::end(handle);
//! assert_eq!(value.ok(), Some(7));
//! ```

use crate::metrics::InteropMetrics;
use actionflow_core::ambient;
use actionflow_core::pending::{AsyncCallback, AsyncResult, AsyncState, CompletionSource, Outcome};
use actionflow_core::{ActionError, PendingComputation};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Begin/end handle over a [`PendingComputation`].
pub struct TaskAsyncResult<T> {
    computation: PendingComputation<T>,
    state: Option<AsyncState>,
    completed_synchronously: bool,
}

impl<T> TaskAsyncResult<T> {
    /// The wrapped computation.
    #[must_use]
    pub const fn computation(&self) -> &PendingComputation<T> {
        &self.computation
    }
}

impl<T> fmt::Debug for TaskAsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskAsyncResult")
            .field("computation", &self.computation)
            .field("completed_synchronously", &self.completed_synchronously)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> AsyncResult for TaskAsyncResult<T> {
    fn is_completed(&self) -> bool {
        self.computation.is_completed()
    }

    fn completed_synchronously(&self) -> bool {
        self.completed_synchronously
    }

    fn async_state(&self) -> Option<&AsyncState> {
        self.state.as_ref()
    }

    fn wait(&self) {
        self.computation.wait_blocking();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Expose `computation` through the begin/end convention.
///
/// If the computation has already finished, `callback` runs before this
/// returns and the handle reports synchronous completion. Otherwise the
/// callback runs once the computation finishes.
pub fn begin<T: Send + 'static>(
    computation: PendingComputation<T>,
    callback: Option<AsyncCallback>,
    state: Option<AsyncState>,
) -> Arc<TaskAsyncResult<T>> {
    let completed_synchronously = computation.is_completed();
    let handle = Arc::new(TaskAsyncResult {
        computation,
        state,
        completed_synchronously,
    });
    InteropMetrics::record_begin(completed_synchronously);

    if let Some(callback) = callback {
        let completed: Arc<dyn AsyncResult> = Arc::clone(&handle) as Arc<dyn AsyncResult>;
        if completed_synchronously {
            callback(completed);
        } else {
            // Runs inline if the computation finished since the check above.
            handle.computation.on_completed(move || callback(completed));
        }
    }

    handle
}

/// Finish a begin/end operation started by [`begin`].
///
/// Blocks the calling thread until the computation finishes, so it must not
/// be called from inside an async task.
///
/// # Errors
///
/// Returns the computation's original fault, [`ActionError::Canceled`] if it
/// was canceled, [`ActionError::AlreadyObserved`] if its outcome was already
/// taken, or [`ActionError::InvalidHandle`] if `handle` did not come from
/// [`begin`] with the same `T`.
pub fn end<T: Send + 'static>(handle: Arc<dyn AsyncResult>) -> Result<T, ActionError> {
    let handle = handle
        .into_any()
        .downcast::<TaskAsyncResult<T>>()
        .map_err(|_| ActionError::InvalidHandle)?;

    handle.computation.wait_blocking();
    handle
        .computation
        .take_outcome()
        .ok_or(ActionError::AlreadyObserved)?
        .into_result()
}

type Pending<T, E> = Arc<Mutex<Option<(CompletionSource<T>, E)>>>;

fn take<T, E>(slot: &Pending<T, E>) -> Option<(CompletionSource<T>, E)> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Await a legacy begin/end pair.
///
/// `begin` runs immediately, with the ambient request context suppressed. The
/// callback it receives calls `end` exactly once and completes the returned
/// computation with its value or fault. If `begin` itself fails the
/// computation faults with that error; if the callback is dropped without
/// being called it faults with [`ActionError::Abandoned`].
pub fn from_begin_end<T, B, E>(begin: B, end: E) -> PendingComputation<T>
where
    T: Send + 'static,
    B: FnOnce(AsyncCallback) -> Result<Arc<dyn AsyncResult>, ActionError>,
    E: FnOnce(Arc<dyn AsyncResult>) -> Result<T, ActionError> + Send + 'static,
{
    let (source, computation) = CompletionSource::new();
    let slot: Pending<T, E> = Arc::new(Mutex::new(Some((source, end))));

    let callback_slot = Arc::clone(&slot);
    let callback: AsyncCallback = Box::new(move |handle| {
        if let Some((source, end)) = take(&callback_slot) {
            source.complete(Outcome::from_result(end(handle)));
        }
    });

    let started = {
        let _quiet = ambient::suppress();
        begin(callback)
    };

    if let Err(error) = started {
        tracing::debug!(error = %error, "Legacy begin call failed");
        if let Some((source, _)) = take(&slot) {
            source.complete(Outcome::Faulted(error));
        }
    }

    computation
}

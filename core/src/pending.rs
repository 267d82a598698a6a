//! In-flight computations and the legacy begin/end contract.
//!
//! [`PendingComputation`] is the handle both calling conventions share. It
//! can be awaited from async code, waited on from a blocking thread, queried
//! for its completion state and given continuations that run once it
//! finishes. It cannot be canceled by itself; cancellation travels through a
//! [`CancellationToken`](tokio_util::sync::CancellationToken) threaded into
//! the action's arguments.
//!
//! [`AsyncResult`] is the handle the legacy begin/end calling convention
//! hands out. The runtime's interop bridge converts between the two.

use crate::error::ActionError;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Completion state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationStatus {
    /// Still running
    Pending,
    /// Completed with a value
    Succeeded,
    /// Completed with a fault
    Faulted,
    /// Completed by cancellation
    Canceled,
}

impl ComputationStatus {
    /// Whether the computation has finished, in any way.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// How a computation finished.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Produced a value
    Succeeded(T),
    /// Raised a fault
    Faulted(ActionError),
    /// Was canceled
    Canceled,
}

impl<T> Outcome<T> {
    /// Map a result, recognising a plain cancellation fault.
    pub fn from_result(result: Result<T, ActionError>) -> Self {
        match result {
            Ok(value) => Self::Succeeded(value),
            Err(ActionError::Canceled) => Self::Canceled,
            Err(error) => Self::Faulted(error),
        }
    }

    /// Convert back into a result; cancellation becomes [`ActionError::Canceled`].
    ///
    /// # Errors
    ///
    /// Returns the fault, or [`ActionError::Canceled`] for a canceled outcome.
    pub fn into_result(self) -> Result<T, ActionError> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Faulted(error) => Err(error),
            Self::Canceled => Err(ActionError::Canceled),
        }
    }

    /// Completion state this outcome represents.
    #[must_use]
    pub const fn status(&self) -> ComputationStatus {
        match self {
            Self::Succeeded(_) => ComputationStatus::Succeeded,
            Self::Faulted(_) => ComputationStatus::Faulted,
            Self::Canceled => ComputationStatus::Canceled,
        }
    }
}

type Continuation = Box<dyn FnOnce() + Send>;

struct State<T> {
    status: ComputationStatus,
    outcome: Option<Outcome<T>>,
    continuations: Vec<Continuation>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    completed: Condvar,
    signal: watch::Sender<bool>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, outcome: Outcome<T>) -> bool {
        let continuations = {
            let mut state = self.lock();
            if state.status.is_completed() {
                return false;
            }
            state.status = outcome.status();
            state.outcome = Some(outcome);
            std::mem::take(&mut state.continuations)
        };

        self.completed.notify_all();
        self.signal.send_replace(true);

        for continuation in continuations {
            continuation();
        }
        true
    }
}

/// Handle to an in-flight (or finished) computation.
///
/// Cloning the handle shares the same computation.
pub struct PendingComputation<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PendingComputation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for PendingComputation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingComputation")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> PendingComputation<T> {
    /// Run a future on the current tokio runtime and return its handle.
    ///
    /// If the future panics the computation faults with [`ActionError::Abandoned`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, ActionError>> + Send + 'static,
    {
        let (source, pending) = CompletionSource::new();
        tokio::spawn(async move {
            let result = future.await;
            source.complete(Outcome::from_result(result));
        });
        pending
    }
}

impl<T> PendingComputation<T> {
    fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    status: ComputationStatus::Pending,
                    outcome: None,
                    continuations: Vec::new(),
                }),
                completed: Condvar::new(),
                signal,
            }),
        }
    }

    /// A computation that has already finished.
    #[must_use]
    pub fn completed(outcome: Outcome<T>) -> Self {
        let pending = Self::new();
        pending.shared.complete(outcome);
        pending
    }

    /// A computation that already succeeded.
    #[must_use]
    pub fn from_value(value: T) -> Self {
        Self::completed(Outcome::Succeeded(value))
    }

    /// Current completion state.
    #[must_use]
    pub fn status(&self) -> ComputationStatus {
        self.shared.lock().status
    }

    /// Whether the computation has finished.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status().is_completed()
    }

    /// Run `continuation` once the computation finishes.
    ///
    /// Returns `true` if it already had finished, in which case the
    /// continuation ran inline before this call returned.
    pub fn on_completed(&self, continuation: impl FnOnce() + Send + 'static) -> bool {
        {
            let mut state = self.shared.lock();
            if !state.status.is_completed() {
                state.continuations.push(Box::new(continuation));
                return false;
            }
        }
        continuation();
        true
    }

    /// Take the outcome if the computation has finished and nobody took it yet.
    #[must_use]
    pub fn take_outcome(&self) -> Option<Outcome<T>> {
        self.shared.lock().outcome.take()
    }

    /// Wait for completion without blocking a thread.
    pub async fn completion(&self) {
        let mut receiver = self.shared.signal.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = receiver.wait_for(|done| *done).await;
    }

    /// Block the calling thread until the computation finishes.
    ///
    /// Must not be called from inside an async task.
    pub fn wait_blocking(&self) {
        let mut state = self.shared.lock();
        while !state.status.is_completed() {
            state = self
                .shared
                .completed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait for completion and take the outcome.
    ///
    /// A second observer gets [`ActionError::AlreadyObserved`].
    pub async fn outcome(&self) -> Outcome<T> {
        self.completion().await;
        self.take_outcome()
            .unwrap_or(Outcome::Faulted(ActionError::AlreadyObserved))
    }

    /// Wait for completion and convert the outcome into a result.
    ///
    /// # Errors
    ///
    /// Returns the computation's fault, [`ActionError::Canceled`] if it was
    /// canceled, or [`ActionError::AlreadyObserved`] if the outcome was taken.
    pub async fn into_result(self) -> Result<T, ActionError> {
        self.outcome().await.into_result()
    }
}

/// Producer side of a [`PendingComputation`].
///
/// The first call to [`complete`](Self::complete) wins. Dropping the source
/// without completing faults the computation with [`ActionError::Abandoned`].
pub struct CompletionSource<T> {
    shared: Arc<Shared<T>>,
}

impl<T> fmt::Debug for CompletionSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSource").finish_non_exhaustive()
    }
}

impl<T> CompletionSource<T> {
    /// Create a source and the computation it completes.
    #[must_use]
    pub fn new() -> (Self, PendingComputation<T>) {
        let pending = PendingComputation::new();
        let source = Self {
            shared: Arc::clone(&pending.shared),
        };
        (source, pending)
    }

    /// Complete the computation. Returns `false` if it already was.
    pub fn complete(&self, outcome: Outcome<T>) -> bool {
        self.shared.complete(outcome)
    }
}

impl<T> Drop for CompletionSource<T> {
    fn drop(&mut self) {
        self.shared.complete(Outcome::Faulted(ActionError::Abandoned));
    }
}

/// Caller-supplied state carried through a begin/end pair.
pub type AsyncState = Arc<dyn Any + Send + Sync>;

/// Callback invoked when a begin/end operation completes.
pub type AsyncCallback = Box<dyn FnOnce(Arc<dyn AsyncResult>) + Send>;

/// Handle returned by the "begin" half of the legacy calling convention.
pub trait AsyncResult: Any + Send + Sync {
    /// Whether the operation has finished.
    fn is_completed(&self) -> bool;

    /// Whether the operation had already finished when "begin" returned.
    fn completed_synchronously(&self) -> bool;

    /// State supplied to "begin", if any.
    fn async_state(&self) -> Option<&AsyncState>;

    /// Block the calling thread until the operation finishes.
    fn wait(&self);

    /// Upcast for the "end" half to recover its concrete handle type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn completed_computation_runs_continuation_inline() {
        let pending = PendingComputation::from_value(5);
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let inline = pending.on_completed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(inline);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pending.status(), ComputationStatus::Succeeded);
    }

    #[test]
    fn continuation_runs_once_on_completion() {
        let (source, pending) = CompletionSource::<u8>::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        assert!(!pending.on_completed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert!(source.complete(Outcome::Canceled));
        assert!(!source.complete(Outcome::Succeeded(1)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pending.status(), ComputationStatus::Canceled);
    }

    #[test]
    fn dropped_source_abandons_computation() {
        let (source, pending) = CompletionSource::<u8>::new();
        drop(source);
        assert_eq!(pending.status(), ComputationStatus::Faulted);
        assert!(matches!(pending.take_outcome(), Some(Outcome::Faulted(ActionError::Abandoned))));
    }

    #[test]
    fn blocking_wait_returns_after_completion_on_other_thread() {
        let (source, pending) = CompletionSource::<&'static str>::new();
        let worker = std::thread::spawn(move || {
            source.complete(Outcome::Succeeded("done"));
        });

        pending.wait_blocking();
        worker.join().ok();
        assert!(matches!(pending.take_outcome(), Some(Outcome::Succeeded("done"))));
    }

    #[tokio::test]
    async fn outcome_is_observed_once() {
        let pending = PendingComputation::spawn(async { Ok::<_, ActionError>(42) });
        let observer = pending.clone();

        assert_eq!(pending.outcome().await.into_result().ok(), Some(42));
        assert!(matches!(
            observer.into_result().await,
            Err(ActionError::AlreadyObserved)
        ));
    }

    #[test]
    fn completion_stays_pending_until_source_completes() {
        let (source, pending) = CompletionSource::<u8>::new();
        let mut waiter = tokio_test::task::spawn(pending.completion());

        tokio_test::assert_pending!(waiter.poll());
        source.complete(Outcome::Succeeded(7));
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[tokio::test]
    async fn canceled_fault_maps_to_canceled_status() {
        let pending = PendingComputation::<()>::spawn(async { Err(ActionError::Canceled) });
        pending.completion().await;
        assert_eq!(pending.status(), ComputationStatus::Canceled);
    }
}

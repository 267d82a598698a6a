//! Thread-scoped ambient request context.
//!
//! Synchronous code called by the pipeline (synchronous actions, the "begin"
//! half of legacy operations) can read which request it runs for through
//! [`current`]. The slot is only populated for the duration of a
//! [`enter`] guard, and [`suppress`] empties it for code that must not pick
//! up caller-specific state. Both guards restore the previous value when
//! dropped, on every exit path.
//!
//! # Example
//!
//! ```
//! use actionflow_core::ambient::{self, AmbientRequest};
//! use uuid::Uuid;
//!
//! let _scope = ambient::enter(AmbientRequest {
//!     request_id: Uuid::new_v4(),
//!     controller: "home".to_string(),
//!     action: "index".to_string(),
//! });
//! assert!(ambient::current().is_some());
//!
//! {
//!     let _quiet = ambient::suppress();
//!     assert!(ambient::current().is_none());
//! }
//! assert!(ambient::current().is_some());
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use uuid::Uuid;

/// Identity of the request the current thread is working for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientRequest {
    /// Request id
    pub request_id: Uuid,
    /// Controller name
    pub controller: String,
    /// Action name
    pub action: String,
}

thread_local! {
    static AMBIENT: RefCell<Option<AmbientRequest>> = const { RefCell::new(None) };
}

/// Restores the previous ambient value when dropped.
///
/// Not `Send`: the guard must be dropped on the thread that created it.
#[derive(Debug)]
#[must_use = "the ambient value is restored as soon as the guard is dropped"]
pub struct AmbientGuard {
    previous: Option<AmbientRequest>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        AMBIENT.with(|slot| *slot.borrow_mut() = previous);
    }
}

fn replace(value: Option<AmbientRequest>) -> AmbientGuard {
    let previous = AMBIENT.with(|slot| slot.replace(value));
    AmbientGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Install `request` as the ambient value until the guard drops.
pub fn enter(request: AmbientRequest) -> AmbientGuard {
    replace(Some(request))
}

/// Clear the ambient value until the guard drops.
pub fn suppress() -> AmbientGuard {
    replace(None)
}

/// The ambient request on this thread, if any.
#[must_use]
pub fn current() -> Option<AmbientRequest> {
    AMBIENT.with(|slot| slot.borrow().clone())
}

//! Shared, ordered record of what ran.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Append-only log shared between fakes so a test can assert on ordering.
///
/// Clones share the same entries.
///
/// # Example
///
/// ```
/// use actionflow_testing::Journal;
///
/// let journal = Journal::new();
/// let shared = journal.clone();
/// shared.record("auth.authenticate");
/// journal.record("action");
///
/// assert_eq!(journal.entries(), ["auth.authenticate", "action"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Create an empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry
    pub fn record(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// Snapshot of every entry, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Whether `entry` was recorded
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.lock().iter().any(|e| e == entry)
    }

    /// How many times `entry` was recorded
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.lock().iter().filter(|e| *e == entry).count()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

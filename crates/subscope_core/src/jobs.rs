//! In-flight operation tracking.
//!
//! Every externally-visible asynchronous operation (connect, subscribe,
//! publish, ...) is bracketed by [`JobTracker::begin`] and
//! [`JobTracker::end`] so a display surface can show what is in progress
//! without the connection layer knowing anything about presentation.

use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    active: BTreeMap<u64, String>,
}

/// Tracks pending jobs as [job id, description] pairs.
///
/// Ids are monotonically increasing for the process lifetime and never
/// reused. Iteration order of [`JobTracker::active`] is insertion order,
/// which the monotone ids give for free.
#[derive(Debug, Default)]
pub struct JobTracker {
    inner: Mutex<Inner>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a new pending job, returning its unique id.
    pub fn begin(&self, description: impl Into<String>) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.active.insert(id, description.into());
        id
    }

    /// Mark a job as completed. Unknown ids are a no-op.
    pub fn end(&self, id: u64) {
        self.inner.lock().unwrap().active.remove(&id);
    }

    /// Descriptions of all active jobs in insertion order.
    pub fn active(&self) -> Vec<String> {
        self.inner.lock().unwrap().active.values().cloned().collect()
    }

    pub fn in_progress(&self) -> bool {
        !self.inner.lock().unwrap().active.is_empty()
    }
}

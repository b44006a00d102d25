//! Concurrent, append-only event log
//!
//! The log keeps its records in an `Arc<Vec<_>>` behind a mutex. Appends push into
//! the vector in place when no snapshot is alive and copy it otherwise
//! (`Arc::make_mut`), so a [`Snapshot`] is never disturbed by later appends and the
//! lock is only ever held for a push or a pointer clone.

use super::tracer_events::{EventFilterFn, TraceRecord};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A record as stored in the log
pub type SharedRecord = Arc<dyn TraceRecord>;

/// Type alias for event callback functions
pub type EventCallback = Arc<dyn Fn(&dyn TraceRecord) + Send + Sync>;

/// Immutable, ordered view of a log at one instant
#[derive(Clone)]
pub struct Snapshot(Arc<Vec<SharedRecord>>);

impl Deref for Snapshot {
    type Target = [SharedRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Ordered record of the events one tracer produced
///
/// EventLog provides thread-safe storage for trace records with support for:
/// - Snapshot iteration while appends continue
/// - A callback triggered on each appended record
/// - Filtering by time range and custom predicates
/// - Query for the last N records
pub struct EventLog {
    events: Mutex<Arc<Vec<SharedRecord>>>,
    on_append_callback: Option<EventCallback>,
}

impl EventLog {
    /// Create a new event log
    ///
    /// # Arguments
    ///
    /// * `on_append_callback` - Optional callback called with every appended record
    pub fn new(on_append_callback: Option<EventCallback>) -> Self {
        Self {
            events: Mutex::new(Arc::new(Vec::new())),
            on_append_callback,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<SharedRecord>>> {
        // A panicking appender cannot leave a half-pushed element behind.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record at the end of the log
    ///
    /// The callback, if any, runs after the record is visible and outside the lock.
    pub fn append(&self, event: SharedRecord) {
        Arc::make_mut(&mut self.lock()).push(Arc::clone(&event));

        if let Some(callback) = &self.on_append_callback {
            callback(event.as_ref());
        }
    }

    /// Ordered copy of the log, unaffected by later appends or clears
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(Arc::clone(&self.lock()))
    }

    /// Count records matching filters
    ///
    /// # Arguments
    ///
    /// * `start_time` - Include records with timestamp >= start_time (epoch millis)
    /// * `end_time` - Include records with timestamp <= end_time (epoch millis)
    /// * `filter_func` - Custom filter to apply to records
    pub fn count_events(
        &self,
        start_time: Option<i64>,
        end_time: Option<i64>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> usize {
        let snapshot = self.snapshot();
        snapshot
            .iter()
            .filter(|e| passes(e.as_ref(), start_time, end_time, filter_func))
            .count()
    }

    /// Get summaries of records matching filters
    ///
    /// # Arguments
    ///
    /// * `start_time` - Include records with timestamp >= start_time (epoch millis)
    /// * `end_time` - Include records with timestamp <= end_time (epoch millis)
    /// * `filter_func` - Custom filter to apply to records
    pub fn event_summaries(
        &self,
        start_time: Option<i64>,
        end_time: Option<i64>,
        filter_func: Option<&dyn EventFilterFn>,
    ) -> Vec<String> {
        let snapshot = self.snapshot();
        snapshot
            .iter()
            .filter(|e| passes(e.as_ref(), start_time, end_time, filter_func))
            .map(|e| e.printable_summary())
            .collect()
    }

    /// Get the last N record summaries, optionally filtered, oldest first
    pub fn last_n_summaries(&self, n: usize, filter_func: Option<&dyn EventFilterFn>) -> Vec<String> {
        let snapshot = self.snapshot();
        let filtered: Vec<&SharedRecord> = snapshot
            .iter()
            .filter(|e| passes(e.as_ref(), None, None, filter_func))
            .collect();

        let start_idx = filtered.len().saturating_sub(n);
        filtered[start_idx..].iter().map(|e| e.printable_summary()).collect()
    }

    /// Remove every record. Snapshots taken earlier keep their contents.
    pub fn clear(&self) {
        *self.lock() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .field("has_callback", &self.on_append_callback.is_some())
            .finish()
    }
}

fn passes(
    event: &dyn TraceRecord,
    start_time: Option<i64>,
    end_time: Option<i64>,
    filter_func: Option<&dyn EventFilterFn>,
) -> bool {
    if start_time.is_some_and(|start| event.timestamp() < start) {
        return false;
    }
    if end_time.is_some_and(|end| event.timestamp() > end) {
        return false;
    }
    filter_func.map_or(true, |filter| filter.matches(event))
}

//! Event sink boundary.
//!
//! This module is the only bridge between engine logic and the global
//! counters. A scoped override replaces the global sink for the current
//! thread, which is how tests observe events.

use crate::{metadata::IndexState, obs::metrics};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn EventSink>>> = const { RefCell::new(None) };
}

///
/// Outcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Completed,
    /// Refused up front (already exists, wrong state, bad arguments).
    Declined,
    /// A store fault interrupted the operation.
    Faulted,
}

///
/// LookupPath
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LookupPath {
    Exact,
    Prefix,
    Unindexed,
}

///
/// IndexEvent
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IndexEvent {
    BuildStarted {
        index: String,
    },
    BuildFinished {
        index: String,
        scanned: u64,
        entries: u64,
        outcome: Outcome,
    },
    DropFinished {
        index: String,
        removed: u64,
        outcome: Outcome,
    },
    EntryWritten {
        index: String,
    },
    EntryRemoved {
        index: String,
    },
    MaintenanceRejected {
        index: String,
        state: IndexState,
    },
    Compensated {
        undone: u64,
        failed: u64,
    },
    Lookup {
        path: LookupPath,
        hits: u64,
        dangling: u64,
    },
}

///
/// EventSink
///

pub trait EventSink {
    fn record(&self, event: &IndexEvent);
}

struct GlobalEventSink;

impl EventSink for GlobalEventSink {
    fn record(&self, event: &IndexEvent) {
        metrics::with_state_mut(|m| match event {
            IndexEvent::BuildStarted { .. } => {
                m.ops.builds_started = m.ops.builds_started.saturating_add(1);
            }
            IndexEvent::BuildFinished {
                index,
                scanned,
                outcome,
                ..
            } => {
                m.ops.records_scanned = m.ops.records_scanned.saturating_add(*scanned);
                match outcome {
                    Outcome::Completed => m.ops.builds_ready = m.ops.builds_ready.saturating_add(1),
                    Outcome::Declined | Outcome::Faulted => {
                        m.ops.builds_failed = m.ops.builds_failed.saturating_add(1);
                    }
                }
                m.index(index);
            }
            IndexEvent::DropFinished { index, outcome, .. } => {
                match outcome {
                    Outcome::Completed => {
                        m.ops.drops_completed = m.ops.drops_completed.saturating_add(1);
                        m.indexes.remove(index);
                    }
                    Outcome::Declined | Outcome::Faulted => {
                        m.ops.drops_failed = m.ops.drops_failed.saturating_add(1);
                    }
                }
            }
            IndexEvent::EntryWritten { index } => {
                m.ops.entries_written = m.ops.entries_written.saturating_add(1);
                let entry = m.index(index);
                entry.entries_written = entry.entries_written.saturating_add(1);
            }
            IndexEvent::EntryRemoved { index } => {
                m.ops.entries_removed = m.ops.entries_removed.saturating_add(1);
                let entry = m.index(index);
                entry.entries_removed = entry.entries_removed.saturating_add(1);
            }
            IndexEvent::MaintenanceRejected { index, .. } => {
                m.ops.maintenance_rejected = m.ops.maintenance_rejected.saturating_add(1);
                let entry = m.index(index);
                entry.maintenance_rejected = entry.maintenance_rejected.saturating_add(1);
            }
            IndexEvent::Compensated { undone, failed } => {
                m.ops.compensations = m.ops.compensations.saturating_add(1);
                m.ops.ops_undone = m.ops.ops_undone.saturating_add(*undone);
                m.ops.undo_failures = m.ops.undo_failures.saturating_add(*failed);
            }
            IndexEvent::Lookup {
                path,
                hits,
                dangling,
            } => {
                match path {
                    LookupPath::Exact => m.ops.lookups_exact = m.ops.lookups_exact.saturating_add(1),
                    LookupPath::Prefix => {
                        m.ops.lookups_prefix = m.ops.lookups_prefix.saturating_add(1);
                    }
                    LookupPath::Unindexed => {
                        m.ops.lookups_unindexed = m.ops.lookups_unindexed.saturating_add(1);
                    }
                }
                m.ops.lookup_hits = m.ops.lookup_hits.saturating_add(*hits);
                m.ops.dangling_refs = m.ops.dangling_refs.saturating_add(*dangling);
            }
        });
    }
}

/// Emit one event to the scoped override, or to the global counters.
pub(crate) fn record(event: IndexEvent) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());

    match override_sink {
        Some(sink) => sink.record(&event),
        None => GlobalEventSink.record(&event),
    }
}

/// Snapshot the process-local counters.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all process-local counters.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary sink override on the current thread.
pub fn with_event_sink<T>(sink: Rc<dyn EventSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn EventSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///

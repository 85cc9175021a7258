use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for index lifecycle and lookups.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub indexes: BTreeMap<String, IndexCounters>,
    pub since_ms: u64,
}

impl EventState {
    pub(crate) fn index(&mut self, name: &str) -> &mut IndexCounters {
        self.indexes.entry(name.to_string()).or_default()
    }
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            indexes: BTreeMap::new(),
            since_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Lifecycle
    pub builds_started: u64,
    pub builds_ready: u64,
    pub builds_failed: u64,
    pub drops_completed: u64,
    pub drops_failed: u64,
    pub records_scanned: u64,

    // Maintenance
    pub entries_written: u64,
    pub entries_removed: u64,
    pub maintenance_rejected: u64,

    // Compensation
    pub compensations: u64,
    pub ops_undone: u64,
    pub undo_failures: u64,

    // Lookup paths
    pub lookups_exact: u64,
    pub lookups_prefix: u64,
    pub lookups_unindexed: u64,
    pub lookup_hits: u64,
    pub dangling_refs: u64,
}

///
/// IndexCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexCounters {
    pub entries_written: u64,
    pub entries_removed: u64,
    pub maintenance_rejected: u64,
}

///
/// EventReport
///

pub type EventReport = EventState;

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

pub(crate) fn report() -> EventReport {
    with_state(Clone::clone)
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// TESTS
///

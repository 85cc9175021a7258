//! Observability: index lifecycle events, the sink boundary, and process-local
//! counters.
//!
//! Engine code emits `IndexEvent`s through `sink::record` only; it never
//! touches counters directly. Human-readable diagnostics go through `tracing`.

pub(crate) mod metrics;
pub(crate) mod sink;

pub use metrics::{EventOps, EventReport, IndexCounters};
pub use sink::{
    EventSink, IndexEvent, LookupPath, Outcome, metrics_report, metrics_reset_all, with_event_sink,
};

use serde::{Deserialize, Serialize};

///
/// Consistency
///
/// Read consistency requested from the store. Interpreted by the store
/// implementation; the engine only passes it through.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Absolute,
    #[default]
    NoneRequired,
}

///
/// RequestOptions
///
/// Per-call consistency and timeout, forwarded unchanged on every primitive
/// store call.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    pub consistency: Consistency,
    pub timeout_ms: Option<u64>,
}

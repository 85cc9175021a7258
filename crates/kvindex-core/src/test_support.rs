//! Shared fixtures for unit tests.

use crate::{
    binding::{FieldMap, FieldValue, RecordBinding, Schema, SchemaRegistry},
    config::EngineConfig,
    key::CompositeKey,
    obs::{EventSink, IndexEvent},
    store::{Consistency, MemoryStore, RequestOptions},
    view::IndexViewEngine,
};
use std::cell::RefCell;

pub(crate) const OPTS: RequestOptions = RequestOptions {
    consistency: Consistency::NoneRequired,
    timeout_ms: None,
};

pub(crate) fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

pub(crate) fn person_binding() -> RecordBinding {
    RecordBinding::new(SchemaRegistry::new([Schema::person()]))
}

pub(crate) fn person_engine() -> IndexViewEngine<MemoryStore> {
    IndexViewEngine::new(MemoryStore::new(), person_binding(), EngineConfig::default())
        .expect("default config is valid")
}

pub(crate) fn person_key(id: i64) -> CompositeKey {
    CompositeKey::from_major(["people", id.to_string().as_str()])
}

/// Encoded `Person` record; `None` names are left out of the record.
pub(crate) fn person_value(
    binding: &RecordBinding,
    id: i64,
    last: Option<&str>,
    first: Option<&str>,
    city: Option<&str>,
) -> Vec<u8> {
    let mut map = FieldMap::new();
    map.insert("id".to_string(), FieldValue::Int(id));
    for (name, value) in [("lastName", last), ("firstName", first), ("city", city)] {
        if let Some(value) = value {
            map.insert(name.to_string(), FieldValue::from(value));
        }
    }

    binding.encode("Person", &map).expect("encode person")
}

///
/// CaptureSink
///

#[derive(Default)]
pub(crate) struct CaptureSink(RefCell<Vec<IndexEvent>>);

impl CaptureSink {
    pub(crate) fn events(&self) -> Vec<IndexEvent> {
        self.0.borrow().clone()
    }
}

impl EventSink for CaptureSink {
    fn record(&self, event: &IndexEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

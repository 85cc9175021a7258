//! Core of kvindex: composite keys, record binding, index metadata, and the
//! index view engine that keeps secondary indexes in step with primary
//! records in an ordered key-value store.

// public exports are one module level down
pub mod binding;
pub mod config;
pub mod error;
pub mod key;
pub mod metadata;
pub mod obs;
pub mod serialize;
pub mod store;
pub mod view;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Domain vocabulary only. Errors, stores, and serializers stay in their
/// modules.
///

pub mod prelude {
    pub use crate::{
        binding::{FieldKind, FieldMap, FieldValue, RecordBinding, Schema, SchemaRegistry},
        config::EngineConfig,
        key::CompositeKey,
        metadata::{IndexMetadata, IndexState},
        view::{IndexCheckReport, IndexViewEngine, LookupResult},
    };
}

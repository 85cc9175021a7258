//! Index view engine: builds, maintains, and queries secondary indexes over
//! the primary records of a `KvStore`.
//!
//! Index entries are key-only records laid out as major
//! `[index_prefix, index_name, value...]`, minor `[primary_path]`. Entries
//! are never updated in place; maintenance removes the old entry and creates
//! the new one.

mod build;
mod compensate;
mod lookup;
mod maintain;
mod verify;


use crate::{
    binding::{FieldValue, RecordBinding},
    config::EngineConfig,
    error::InternalError,
    key::{CompositeKey, parse_path},
    metadata::{IndexMetadata, IndexMetadataStore},
    store::{EntryIter, KvStore, ScanOrder, StoreError, StoredEntry},
};
use tracing::warn;

pub use compensate::CompensatingOp;
pub use lookup::{LookupHit, LookupResult};
pub use verify::IndexCheckReport;

///
/// IndexViewEngine
///
/// Stateless facade over one store. Every operation is a sequence of
/// blocking store round trips; nothing is cached between calls.
///

pub struct IndexViewEngine<S: KvStore> {
    store: S,
    binding: RecordBinding,
    config: EngineConfig,
}

impl<S: KvStore> IndexViewEngine<S> {
    pub fn new(
        store: S,
        binding: RecordBinding,
        config: EngineConfig,
    ) -> Result<Self, InternalError> {
        config.validate()?;

        Ok(Self {
            store,
            binding,
            config,
        })
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn binding(&self) -> &RecordBinding {
        &self.binding
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Metadata view over this engine's store.
    pub fn metadata(&self) -> IndexMetadataStore<'_, S> {
        IndexMetadataStore::new(&self.store, &self.config)
    }

    /// Every declared index, ordered by name.
    pub fn list_indexes(&self) -> Result<Vec<IndexMetadata>, InternalError> {
        Ok(self.metadata().list_all()?)
    }

    // Whether `fields` can be indexed on `schema` under the configured limits.
    fn accepts_declaration(&self, schema: &str, fields: &[String]) -> bool {
        if fields.is_empty() || fields.len() > self.config.max_index_fields {
            warn!(
                schema,
                fields = fields.len(),
                max = self.config.max_index_fields,
                "index field count out of range"
            );
            return false;
        }

        if let Err(err) = self.binding.check_field_names(schema, fields) {
            warn!(schema, error = %err, "index declaration rejected");
            return false;
        }

        true
    }

    /// Root of every entry of one index.
    fn entry_root(&self, index: &str) -> CompositeKey {
        CompositeKey::from_major([self.config.index_prefix.as_str(), index])
    }

    /// Entry key for `primary`, or `None` when a value is null.
    fn entry_key(
        &self,
        index: &str,
        values: &[FieldValue],
        primary: &CompositeKey,
    ) -> Option<CompositeKey> {
        let mut key = self.entry_root(index);
        for value in values {
            key = key.child(value.to_segment()?);
        }

        Some(key.with_minor([primary.to_path_string()]))
    }

    /// Primary key an entry points at.
    fn entry_target(entry: &CompositeKey) -> Result<CompositeKey, InternalError> {
        let [path] = entry.minor() else {
            return Err(InternalError::index_invariant(format!(
                "index entry '{entry}' must carry exactly one primary key"
            )));
        };

        Ok(parse_path(path)?)
    }

    /// Scan over every primary record, reserved namespaces excluded.
    fn scan_primary(&self) -> Result<impl Iterator<Item = PrimaryItem> + '_, StoreError> {
        let root = self
            .config
            .data_prefix
            .as_ref()
            .map_or_else(CompositeKey::default, |p| {
                CompositeKey::from_major([p.as_str()])
            });
        let entries: EntryIter<'_> =
            self.store
                .scan_entries(&root, ScanOrder::Unordered, &self.config.request)?;

        Ok(entries.filter(|item| match item {
            Ok(entry) => !entry
                .key
                .root()
                .is_some_and(|root| self.config.is_reserved_root(root)),
            Err(_) => true,
        }))
    }
}

type PrimaryItem = Result<StoredEntry, StoreError>;

// Store faults and binding failures become a soft `false`; anything else
// propagates.
fn soften(op: &'static str, err: InternalError) -> Result<bool, InternalError> {
    if err.is_transient() || err.is_binding() {
        warn!(op, error = %err.display_with_class(), "index operation declined");
        return Ok(false);
    }

    Err(err)
}

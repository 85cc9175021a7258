//! Index metadata records, persisted in the same keyspace as the data.
//!
//! Layout: major `[metadata_prefix, index_name]`, minor
//! `[schema, field..., STATE]`, empty value. The state lives in the key, so a
//! transition writes a new record and deletes the old one; a reader that
//! observes both keeps the later lifecycle stage.

mod fingerprint;
mod state;


use crate::{
    config::EngineConfig,
    error::{ErrorClass, ErrorOrigin, InternalError},
    key::CompositeKey,
    store::{KvStore, RequestOptions, ScanOrder, StoreError},
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;
use tracing::debug;

pub use fingerprint::index_name;
pub use state::IndexState;

///
/// MetadataError
///

#[derive(Debug, ThisError)]
pub enum MetadataError {
    #[error("index '{index}' not found")]
    NotFound { index: String },

    #[error("index '{index}': illegal transition {from} -> {to}")]
    IllegalTransition {
        index: String,
        from: IndexState,
        to: IndexState,
    },

    #[error("corrupt metadata key '{key}': {reason}")]
    Corrupt { key: String, reason: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MetadataError> for InternalError {
    fn from(err: MetadataError) -> Self {
        let class = match err {
            MetadataError::Store(inner) => return inner.into(),
            MetadataError::NotFound { .. } => ErrorClass::NotFound,
            MetadataError::IllegalTransition { .. } => ErrorClass::InvariantViolation,
            MetadataError::Corrupt { .. } => ErrorClass::Corruption,
        };

        Self::new(class, ErrorOrigin::Metadata, err.to_string())
    }
}

///
/// IndexMetadata
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct IndexMetadata {
    pub name: String,
    pub schema: String,
    pub fields: Vec<String>,
    pub state: IndexState,
}

impl IndexMetadata {
    #[must_use]
    pub fn new(schema: impl Into<String>, fields: Vec<String>, state: IndexState) -> Self {
        let schema = schema.into();

        Self {
            name: index_name(&schema, &fields),
            schema,
            fields,
            state,
        }
    }

    /// True when `fields` is a strict leading prefix of this index's fields.
    #[must_use]
    pub fn strictly_extends(&self, fields: &[String]) -> bool {
        self.fields.len() > fields.len() && self.fields.starts_with(fields)
    }

    fn to_key(&self, prefix: &str) -> CompositeKey {
        let minor = std::iter::once(self.schema.as_str())
            .chain(self.fields.iter().map(String::as_str))
            .chain(std::iter::once(self.state.as_str()));

        CompositeKey::from_major([prefix, self.name.as_str()]).with_minor(minor)
    }

    fn from_key(prefix: &str, key: &CompositeKey) -> Result<Self, MetadataError> {
        let corrupt = |reason| MetadataError::Corrupt {
            key: key.to_path_string(),
            reason,
        };

        let [root, name] = key.major() else {
            return Err(corrupt("expected two major segments"));
        };
        if root != prefix {
            return Err(corrupt("foreign root segment"));
        }

        let [schema, fields @ .., state] = key.minor() else {
            return Err(corrupt("expected schema, fields and state"));
        };
        if fields.is_empty() {
            return Err(corrupt("empty field list"));
        }
        let state = IndexState::parse(state).ok_or_else(|| corrupt("unknown state"))?;

        Ok(Self {
            name: name.clone(),
            schema: schema.clone(),
            fields: fields.to_vec(),
            state,
        })
    }
}

///
/// IndexMetadataStore
///
/// Reads and writes metadata records through the store contract. Holds no
/// state of its own; concurrent writers are arbitrated by `put_if_absent`.
///

pub struct IndexMetadataStore<'a, S: KvStore + ?Sized> {
    store: &'a S,
    prefix: &'a str,
    opts: RequestOptions,
}

impl<'a, S: KvStore + ?Sized> IndexMetadataStore<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self {
            store,
            prefix: config.metadata_prefix.as_str(),
            opts: config.request,
        }
    }

    /// Create a `Building` record; false if any record already exists for
    /// the name or a concurrent writer won the put.
    pub fn create(
        &self,
        index: &str,
        schema: &str,
        fields: &[String],
    ) -> Result<bool, MetadataError> {
        if !self.records(index)?.is_empty() {
            return Ok(false);
        }

        let meta = IndexMetadata {
            name: index.to_string(),
            schema: schema.to_string(),
            fields: fields.to_vec(),
            state: IndexState::Building,
        };
        let won = self
            .store
            .put_if_absent(&meta.to_key(self.prefix), &[], &self.opts)?
            .is_some();
        debug!(index, schema, won, "index metadata created");

        Ok(won)
    }

    /// Unconditional transition: write the new record, then delete the old.
    pub fn set_state(&self, index: &str, next: IndexState) -> Result<(), MetadataError> {
        let current = self.get(index)?.ok_or_else(|| MetadataError::NotFound {
            index: index.to_string(),
        })?;
        if !current.state.can_transition_to(next) {
            return Err(MetadataError::IllegalTransition {
                index: index.to_string(),
                from: current.state,
                to: next,
            });
        }

        self.replace(&current, next)
    }

    /// Optimistic transition: observe `from`, write `to`, remove `from`, then
    /// verify that `to` is what readers now see.
    pub fn transition(
        &self,
        index: &str,
        from: IndexState,
        to: IndexState,
    ) -> Result<bool, MetadataError> {
        if !from.can_transition_to(to) {
            return Err(MetadataError::IllegalTransition {
                index: index.to_string(),
                from,
                to,
            });
        }

        let Some(current) = self.get(index)? else {
            return Ok(false);
        };
        if current.state != from {
            return Ok(false);
        }

        self.replace(&current, to)?;

        Ok(self.get_state(index)? == Some(to))
    }

    pub fn get_state(&self, index: &str) -> Result<Option<IndexState>, MetadataError> {
        Ok(self.get(index)?.map(|meta| meta.state))
    }

    /// Current record for `index`; the later lifecycle stage wins.
    pub fn get(&self, index: &str) -> Result<Option<IndexMetadata>, MetadataError> {
        Ok(self
            .records(index)?
            .into_iter()
            .max_by_key(|meta| meta.state.precedence()))
    }

    /// Every index, one record per name, ordered by name.
    pub fn list_all(&self) -> Result<Vec<IndexMetadata>, MetadataError> {
        let root = CompositeKey::from_major([self.prefix]);
        let mut by_name = BTreeMap::<String, IndexMetadata>::new();

        for key in self.store.scan_keys(&root, ScanOrder::Unordered, &self.opts)? {
            let meta = IndexMetadata::from_key(self.prefix, &key?)?;
            match by_name.get(&meta.name) {
                Some(seen) if seen.state.precedence() >= meta.state.precedence() => {}
                _ => {
                    by_name.insert(meta.name.clone(), meta);
                }
            }
        }

        Ok(by_name.into_values().collect())
    }

    /// Remove every record under the index name; returns how many went.
    pub fn delete(&self, index: &str) -> Result<u64, MetadataError> {
        let mut removed = 0;
        for meta in self.records(index)? {
            if self.store.delete(&meta.to_key(self.prefix), &self.opts)? {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Index declared on exactly `fields` (in order) of `schema`, in any state.
    pub fn find_exact(
        &self,
        schema: &str,
        fields: &[String],
    ) -> Result<Option<IndexMetadata>, MetadataError> {
        let found = self.get(&index_name(schema, fields))?;

        Ok(found.filter(|meta| meta.schema == schema && meta.fields == fields))
    }

    /// Ready index of `schema` whose fields strictly extend `fields`.
    ///
    /// Shortest field list wins, then the smallest index name.
    pub fn find_usable_prefix_index(
        &self,
        schema: &str,
        fields: &[String],
    ) -> Result<Option<IndexMetadata>, MetadataError> {
        Ok(self
            .for_schema(schema)?
            .into_iter()
            .filter(|meta| meta.state.is_usable() && meta.strictly_extends(fields))
            .min_by(|a, b| {
                a.fields
                    .len()
                    .cmp(&b.fields.len())
                    .then_with(|| a.name.cmp(&b.name))
            }))
    }

    /// Every index declared on `schema`, in any state.
    pub fn for_schema(&self, schema: &str) -> Result<Vec<IndexMetadata>, MetadataError> {
        let mut all = self.list_all()?;
        all.retain(|meta| meta.schema == schema);

        Ok(all)
    }

    fn records(&self, index: &str) -> Result<Vec<IndexMetadata>, MetadataError> {
        let prefix = CompositeKey::from_major([self.prefix, index]);

        self.store
            .scan_keys(&prefix, ScanOrder::Forward, &self.opts)?
            .map(|key| IndexMetadata::from_key(self.prefix, &key?))
            .collect()
    }

    fn replace(&self, current: &IndexMetadata, next: IndexState) -> Result<(), MetadataError> {
        let updated = IndexMetadata {
            state: next,
            ..current.clone()
        };

        self.store
            .put_if_absent(&updated.to_key(self.prefix), &[], &self.opts)?;
        self.store
            .delete(&current.to_key(self.prefix), &self.opts)?;
        debug!(
            index = current.name.as_str(),
            from = %current.state,
            to = %next,
            "index state changed"
        );

        Ok(())
    }
}

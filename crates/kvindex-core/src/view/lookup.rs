use crate::{
    binding::FieldValue,
    error::InternalError,
    key::CompositeKey,
    obs::sink::{self, IndexEvent, LookupPath},
    store::{KvStore, ScanOrder, Version},
    view::IndexViewEngine,
};
use std::collections::BTreeMap;
use tracing::debug;

///
/// LookupHit
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LookupHit {
    pub value: Vec<u8>,
    pub version: Version,
    /// Index that served the lookup.
    pub index: String,
}

/// Matching primary records, ordered by primary key.
pub type LookupResult = BTreeMap<CompositeKey, LookupHit>;

impl<S: KvStore> IndexViewEngine<S> {
    /// Find primary records of `schema` whose `fields` equal `values`.
    ///
    /// Served by a ready index on exactly `fields`, else by the ready index
    /// whose fields extend them most narrowly. `None` when neither exists.
    /// Entries whose primary record has vanished are skipped.
    pub fn lookup(
        &self,
        fields: &[String],
        values: &[FieldValue],
        schema: &str,
    ) -> Result<Option<LookupResult>, InternalError> {
        if fields.is_empty() {
            return Err(InternalError::query_unsupported(
                "lookup needs at least one field",
            ));
        }
        if fields.len() != values.len() {
            return Err(InternalError::query_unsupported(format!(
                "lookup has {} fields but {} values",
                fields.len(),
                values.len()
            )));
        }
        let segments = values
            .iter()
            .zip(fields)
            .map(|(value, field)| {
                value.to_segment().ok_or_else(|| {
                    InternalError::query_unsupported(format!(
                        "field '{field}' is null; null values are not indexed"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = self.metadata();
        let opts = &self.config.request;

        let (path, index, keys) = if let Some(exact) = metadata
            .find_exact(schema, fields)?
            .filter(|meta| meta.state.is_usable())
        {
            let prefix = self.value_prefix(&exact.name, segments);
            let keys = self.store.multi_get_keys(&prefix, opts)?;
            (LookupPath::Exact, exact.name, keys)
        } else if let Some(wider) = metadata.find_usable_prefix_index(schema, fields)? {
            let prefix = self.value_prefix(&wider.name, segments);
            let keys = self
                .store
                .scan_keys(&prefix, ScanOrder::Forward, opts)?
                .collect::<Result<Vec<_>, _>>()?;
            (LookupPath::Prefix, wider.name, keys)
        } else {
            debug!(schema, ?fields, "no ready index serves lookup");
            sink::record(IndexEvent::Lookup {
                path: LookupPath::Unindexed,
                hits: 0,
                dangling: 0,
            });
            return Ok(None);
        };

        let mut result = LookupResult::new();
        let mut dangling = 0u64;
        for entry in &keys {
            let primary = Self::entry_target(entry)?;
            match self.store.get(&primary, opts)? {
                Some((value, version)) => {
                    result.insert(
                        primary,
                        LookupHit {
                            value,
                            version,
                            index: index.clone(),
                        },
                    );
                }
                None => {
                    debug!(%primary, index = %index, "skipping dangling index entry");
                    dangling += 1;
                }
            }
        }

        sink::record(IndexEvent::Lookup {
            path,
            hits: result.len() as u64,
            dangling,
        });

        Ok(Some(result))
    }

    fn value_prefix(&self, index: &str, segments: Vec<String>) -> CompositeKey {
        segments
            .into_iter()
            .fold(self.entry_root(index), |key, segment| key.child(segment))
    }
}

use crate::{
    error::InternalError,
    key::CompositeKey,
    store::{KvStore, ScanOrder},
    view::IndexViewEngine,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

///
/// IndexCheckReport
///
/// Divergence between one ready index and the primary records. Every list
/// holds primary keys.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct IndexCheckReport {
    pub index: String,
    pub scanned: u64,
    pub entries: u64,

    /// Records that should be indexed but have no entry.
    pub missing: Vec<CompositeKey>,

    /// Entries whose primary record no longer exists.
    pub dangling: Vec<CompositeKey>,

    /// Entries whose primary record exists with different field values.
    pub stale: Vec<CompositeKey>,
}

impl IndexCheckReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.dangling.is_empty() && self.stale.is_empty()
    }
}

impl<S: KvStore> IndexViewEngine<S> {
    /// Compare a ready index with a full scan of the primary records.
    ///
    /// Detection only; the remedy for divergence is `rebuild_index`.
    pub fn check_index(
        &self,
        fields: &[String],
        schema: &str,
    ) -> Result<Option<IndexCheckReport>, InternalError> {
        let Some(meta) = self
            .metadata()
            .find_exact(schema, fields)?
            .filter(|meta| meta.state.is_usable())
        else {
            return Ok(None);
        };

        let mut report = IndexCheckReport {
            index: meta.name.clone(),
            ..IndexCheckReport::default()
        };

        let mut expected = BTreeSet::new();
        for item in self.scan_primary()? {
            let entry = item?;
            report.scanned += 1;

            let Ok(Some(record)) = self.binding.decode(&entry.value) else {
                continue;
            };
            if record.schema != schema {
                continue;
            }
            let Ok(values) = self.binding.extract_from(&record, fields) else {
                continue;
            };
            if let Some(key) = self.entry_key(&meta.name, &values, &entry.key) {
                expected.insert(key);
            }
        }

        let actual = self
            .store
            .scan_keys(
                &self.entry_root(&meta.name),
                ScanOrder::Unordered,
                &self.config.request,
            )?
            .collect::<Result<BTreeSet<_>, _>>()?;
        report.entries = actual.len() as u64;

        for key in expected.difference(&actual) {
            report.missing.push(Self::entry_target(key)?);
        }
        for key in actual.difference(&expected) {
            let primary = Self::entry_target(key)?;
            if self.store.get(&primary, &self.config.request)?.is_some() {
                report.stale.push(primary);
            } else {
                report.dangling.push(primary);
            }
        }

        info!(
            index = %report.index,
            scanned = report.scanned,
            entries = report.entries,
            missing = report.missing.len(),
            dangling = report.dangling.len(),
            stale = report.stale.len(),
            "index checked"
        );

        Ok(Some(report))
    }
}

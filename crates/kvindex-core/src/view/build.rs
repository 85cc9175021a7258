use crate::{
    error::InternalError,
    metadata::{IndexState, index_name},
    obs::sink::{self, IndexEvent, Outcome},
    store::{KvStore, ScanOrder},
    view::{IndexViewEngine, compensate, soften},
};
use tracing::{error, info, warn};

///
/// BuildStats
///

#[derive(Clone, Copy, Debug, Default)]
struct BuildStats {
    scanned: u64,
    entries: u64,
}

impl<S: KvStore> IndexViewEngine<S> {
    /// Declare an index on `fields` of `schema` and populate it from a full
    /// scan of the primary records.
    ///
    /// Returns false when the declaration is invalid, the index already
    /// exists, or a store fault interrupted the build. A faulted build is
    /// unwound, so the call can simply be retried.
    pub fn build_index(&self, fields: &[String], schema: &str) -> Result<bool, InternalError> {
        if !self.accepts_declaration(schema, fields) {
            return Ok(false);
        }

        let index = index_name(schema, fields);
        match self.metadata().create(&index, schema, fields) {
            Ok(true) => {}
            Ok(false) => {
                info!(index = %index, schema, "index already exists");
                return Ok(false);
            }
            Err(err) => {
                let err = InternalError::from(err);
                if err.is_transient() {
                    warn!(index = %index, error = %err, "index declaration interrupted");
                    return Ok(false);
                }
                return Err(err);
            }
        }

        info!(index = %index, schema, ?fields, "index build started");
        sink::record(IndexEvent::BuildStarted {
            index: index.clone(),
        });

        let result = self.populate(&index, schema, fields).and_then(|stats| {
            let ready = self
                .metadata()
                .transition(&index, IndexState::Building, IndexState::Ready)?;
            Ok((stats, ready))
        });

        let (stats, outcome) = match result {
            Ok((stats, true)) => (stats, Outcome::Completed),
            Ok((stats, false)) => {
                warn!(index = %index, "index left BUILDING by a concurrent writer");
                (stats, Outcome::Declined)
            }
            Err(err) => {
                self.unwind_build(&index);
                sink::record(IndexEvent::BuildFinished {
                    index: index.clone(),
                    scanned: 0,
                    entries: 0,
                    outcome: Outcome::Faulted,
                });
                if err.is_transient() {
                    warn!(index = %index, error = %err, "index build faulted and was unwound");
                    return Ok(false);
                }
                return Err(err);
            }
        };

        info!(
            index = %index,
            scanned = stats.scanned,
            entries = stats.entries,
            "index build finished"
        );
        sink::record(IndexEvent::BuildFinished {
            index,
            scanned: stats.scanned,
            entries: stats.entries,
            outcome,
        });

        Ok(outcome == Outcome::Completed)
    }

    /// Remove a ready index, its entries and its metadata.
    ///
    /// A faulted drop leaves the index `Deleting`; calling again resumes it.
    pub fn drop_index(&self, fields: &[String], schema: &str) -> Result<bool, InternalError> {
        let metadata = self.metadata();
        let current = match metadata.find_exact(schema, fields) {
            Ok(found) => found,
            Err(err) => return soften("drop", err.into()),
        };

        let Some(current) = current else {
            return Ok(false);
        };
        let index = current.name;

        match current.state {
            IndexState::Building => {
                info!(index = %index, "refusing to drop an index that is still building");
                sink::record(IndexEvent::DropFinished {
                    index,
                    removed: 0,
                    outcome: Outcome::Declined,
                });
                return Ok(false);
            }
            IndexState::Ready => {
                match metadata.transition(&index, IndexState::Ready, IndexState::Deleting) {
                    Ok(true) => {}
                    Ok(false) => return Ok(false),
                    Err(err) => return soften("drop", err.into()),
                }
            }
            IndexState::Deleting => info!(index = %index, "resuming interrupted index drop"),
        }

        info!(index = %index, "index drop started");
        let result = self.remove_entries(&index).and_then(|removed| {
            metadata.delete(&index)?;
            Ok(removed)
        });

        match result {
            Ok(removed) => {
                info!(index = %index, removed, "index dropped");
                sink::record(IndexEvent::DropFinished {
                    index,
                    removed,
                    outcome: Outcome::Completed,
                });
                Ok(true)
            }
            Err(err) => {
                sink::record(IndexEvent::DropFinished {
                    index: index.clone(),
                    removed: 0,
                    outcome: Outcome::Faulted,
                });
                warn!(index = %index, error = %err, "index drop interrupted; left DELETING");
                soften("drop", err)
            }
        }
    }

    /// Drop the index if it exists, then build it again.
    pub fn rebuild_index(&self, fields: &[String], schema: &str) -> Result<bool, InternalError> {
        let exists = match self.metadata().find_exact(schema, fields) {
            Ok(found) => found.is_some(),
            Err(err) => return soften("rebuild", err.into()),
        };

        if exists && !self.drop_index(fields, schema)? {
            return Ok(false);
        }

        self.build_index(fields, schema)
    }

    // Scan every primary record and create the entries it implies. Records
    // that do not bind, belong to another schema, or carry a null indexed
    // value are skipped.
    fn populate(
        &self,
        index: &str,
        schema: &str,
        fields: &[String],
    ) -> Result<BuildStats, InternalError> {
        let mut stats = BuildStats::default();

        for item in self.scan_primary()? {
            let entry = item?;
            stats.scanned += 1;

            let Ok(Some(record)) = self.binding.decode(&entry.value) else {
                continue;
            };
            if record.schema != schema {
                continue;
            }
            let Ok(values) = self.binding.extract_from(&record, fields) else {
                continue;
            };
            let Some(key) = self.entry_key(index, &values, &entry.key) else {
                continue;
            };

            if compensate::create_entry(&self.store, index, &key, &self.config.request)? {
                stats.entries += 1;
            }
        }

        Ok(stats)
    }

    // Delete every entry under the index root; returns how many went.
    fn remove_entries(&self, index: &str) -> Result<u64, InternalError> {
        let root = self.entry_root(index);
        let opts = &self.config.request;

        let keys = self
            .store
            .scan_keys(&root, ScanOrder::Unordered, opts)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut removed = 0;
        for key in &keys {
            if compensate::remove_entry(&self.store, index, key, opts)? {
                removed += 1;
            }
        }

        Ok(removed)
    }

    // Undo a failed build: entries first, then metadata. A fault here
    // leaves orphans behind.
    fn unwind_build(&self, index: &str) {
        let entries = self.remove_entries(index);
        let metadata = self.metadata().delete(index).map_err(InternalError::from);

        let mut undone = 0;
        let mut failed = 0;
        for (step, result) in [("entries", entries), ("metadata", metadata)] {
            match result {
                Ok(n) => undone += n,
                Err(err) => {
                    failed += 1;
                    error!(
                        index,
                        step,
                        error = %err,
                        "build unwind failed; orphaned index data remains"
                    );
                }
            }
        }

        sink::record(IndexEvent::Compensated { undone, failed });
    }
}

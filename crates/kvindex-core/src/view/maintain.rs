use crate::{
    binding::DecodedRecord,
    error::InternalError,
    key::CompositeKey,
    metadata::IndexMetadata,
    obs::sink::{self, IndexEvent},
    store::KvStore,
    view::{
        IndexViewEngine, soften,
        compensate::{CompensatingOp, CompensationLog},
    },
};
use tracing::{debug, error, info};

// Index mutations applied but not yet committed; `None` means declined.
type Staged<'a, S> = Option<CompensationLog<'a, S>>;

///
/// Stored
///
/// What currently sits under a primary key.
///

enum Stored {
    Absent,
    /// Bytes that are not a structured record; never indexed.
    Unstructured,
    Record(DecodedRecord),
}

impl<S: KvStore> IndexViewEngine<S> {
    /// Create the index entries of a primary record that was just written.
    ///
    /// False when the record is absent or unstructured, when a matching
    /// index is not ready, or on a store fault; any partial work is undone.
    pub fn on_insert(&self, primary: &CompositeKey) -> Result<bool, InternalError> {
        commit("insert", self.stage_insert(primary))
    }

    /// Move the index entries of a primary record that is about to be
    /// overwritten with `new_value`.
    pub fn on_update(
        &self,
        primary: &CompositeKey,
        new_value: Option<&[u8]>,
    ) -> Result<bool, InternalError> {
        commit("update", self.stage_update(primary, new_value))
    }

    /// Remove the index entries of a primary record that is about to be
    /// deleted.
    pub fn on_delete(&self, primary: &CompositeKey) -> Result<bool, InternalError> {
        commit("delete", self.stage_delete(primary))
    }

    /// Write a new primary record, then index it.
    ///
    /// The record is removed again when indexing fails. Unstructured values
    /// are stored without touching any index.
    pub fn insert_record(
        &self,
        primary: &CompositeKey,
        value: &[u8],
    ) -> Result<bool, InternalError> {
        let opts = self.config.request;

        let record = match self.binding.decode(value) {
            Ok(record) => record,
            Err(err) => return soften("insert", err.into()),
        };
        match self.store.put_if_absent(primary, value, &opts) {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(%primary, "insert refused; primary record exists");
                return Ok(false);
            }
            Err(err) => return soften("insert", err.into()),
        }

        let Some(record) = record else {
            return Ok(true);
        };

        let failure = match self.stage_record_insert(primary, &record) {
            Ok(Some(log)) => {
                log.finish();
                return Ok(true);
            }
            Ok(None) => None,
            Err(err) => Some(err),
        };

        if let Err(err) = self.store.delete(primary, &opts) {
            error!(
                %primary,
                error = %err,
                "failed to remove primary record after index failure"
            );
        }

        failure.map_or(Ok(false), |err| soften("insert", err))
    }

    /// Re-index, then overwrite the primary record. A failed write restores
    /// the old entries. An unstructured record has no entries, so only the
    /// new value is indexed.
    pub fn update_record(
        &self,
        primary: &CompositeKey,
        value: &[u8],
    ) -> Result<bool, InternalError> {
        let staged = match self.read_record(primary) {
            Ok(Stored::Absent) => Ok(None),
            Ok(Stored::Unstructured) => self.stage_unstructured_update(primary, value),
            Ok(Stored::Record(old)) => self.stage_record_update(primary, &old, Some(value)),
            Err(err) => Err(err),
        };
        let log = match staged {
            Ok(Some(log)) => log,
            Ok(None) => return Ok(false),
            Err(err) => return soften("update", err),
        };

        match self.store.put(primary, value, &self.config.request) {
            Ok(_) => {
                log.finish();
                Ok(true)
            }
            Err(err) => {
                drop(log);
                soften("update", err.into())
            }
        }
    }

    /// Remove index entries, then the primary record. A failed delete
    /// restores the entries. An unstructured record is deleted directly.
    pub fn delete_record(&self, primary: &CompositeKey) -> Result<bool, InternalError> {
        let staged = match self.read_record(primary) {
            Ok(Stored::Absent) => Ok(None),
            Ok(Stored::Unstructured) => {
                Ok(Some(CompensationLog::new(&self.store, self.config.request, "delete")))
            }
            Ok(Stored::Record(record)) => self.stage_record_delete(primary, &record),
            Err(err) => Err(err),
        };
        let log = match staged {
            Ok(Some(log)) => log,
            Ok(None) => return Ok(false),
            Err(err) => return soften("delete", err),
        };

        match self.store.delete(primary, &self.config.request) {
            Ok(_) => {
                log.finish();
                Ok(true)
            }
            Err(err) => {
                drop(log);
                soften("delete", err.into())
            }
        }
    }

    fn stage_insert(&self, primary: &CompositeKey) -> Result<Staged<'_, S>, InternalError> {
        let Stored::Record(record) = self.read_record(primary)? else {
            return Ok(None);
        };

        self.stage_record_insert(primary, &record)
    }

    fn stage_record_insert(
        &self,
        primary: &CompositeKey,
        record: &DecodedRecord,
    ) -> Result<Staged<'_, S>, InternalError> {
        self.stage("insert", &record.schema, |meta| {
            let values = self.binding.extract_from(record, &meta.fields)?;

            Ok(self
                .entry_key(&meta.name, &values, primary)
                .map(|key| CompensatingOp::CreateEntry {
                    index: meta.name.clone(),
                    key,
                })
                .into_iter()
                .collect())
        })
    }

    fn stage_update(
        &self,
        primary: &CompositeKey,
        new_value: Option<&[u8]>,
    ) -> Result<Staged<'_, S>, InternalError> {
        let Stored::Record(old) = self.read_record(primary)? else {
            return Ok(None);
        };

        self.stage_record_update(primary, &old, new_value)
    }

    fn stage_record_update(
        &self,
        primary: &CompositeKey,
        old: &DecodedRecord,
        new_value: Option<&[u8]>,
    ) -> Result<Staged<'_, S>, InternalError> {
        let Some(new_value) = new_value else {
            debug!(%primary, "update without a new value");
            return Ok(None);
        };
        let Some(new) = self.binding.decode(new_value)? else {
            debug!(%primary, "new value is not a structured record");
            return Ok(None);
        };
        if old.schema != new.schema {
            debug!(
                %primary,
                old = %old.schema,
                new = %new.schema,
                "update changes schema"
            );
            return Ok(None);
        }

        self.stage("update", &old.schema, |meta| {
            let before = self.binding.extract_from(old, &meta.fields)?;
            let after = self.binding.extract_from(&new, &meta.fields)?;
            let before = self.entry_key(&meta.name, &before, primary);
            let after = self.entry_key(&meta.name, &after, primary);
            if before == after {
                return Ok(Vec::new());
            }

            let mut ops = Vec::with_capacity(2);
            if let Some(key) = before {
                ops.push(CompensatingOp::RemoveEntry {
                    index: meta.name.clone(),
                    key,
                });
            }
            if let Some(key) = after {
                ops.push(CompensatingOp::CreateEntry {
                    index: meta.name.clone(),
                    key,
                });
            }

            Ok(ops)
        })
    }

    // Overwriting an unstructured record: nothing to remove, so stage the
    // new value as if it were inserted.
    fn stage_unstructured_update(
        &self,
        primary: &CompositeKey,
        new_value: &[u8],
    ) -> Result<Staged<'_, S>, InternalError> {
        match self.binding.decode(new_value)? {
            Some(new) => self.stage_record_insert(primary, &new),
            None => Ok(Some(CompensationLog::new(
                &self.store,
                self.config.request,
                "update",
            ))),
        }
    }

    fn stage_delete(&self, primary: &CompositeKey) -> Result<Staged<'_, S>, InternalError> {
        let Stored::Record(record) = self.read_record(primary)? else {
            return Ok(None);
        };

        self.stage_record_delete(primary, &record)
    }

    fn stage_record_delete(
        &self,
        primary: &CompositeKey,
        record: &DecodedRecord,
    ) -> Result<Staged<'_, S>, InternalError> {
        self.stage("delete", &record.schema, |meta| {
            let values = self.binding.extract_from(record, &meta.fields)?;

            Ok(self
                .entry_key(&meta.name, &values, primary)
                .map(|key| CompensatingOp::RemoveEntry {
                    index: meta.name.clone(),
                    key,
                })
                .into_iter()
                .collect())
        })
    }

    fn read_record(&self, primary: &CompositeKey) -> Result<Stored, InternalError> {
        let Some((value, _)) = self.store.get(primary, &self.config.request)? else {
            debug!(%primary, "primary record not found");
            return Ok(Stored::Absent);
        };

        Ok(match self.binding.decode(&value)? {
            Some(record) => Stored::Record(record),
            None => {
                debug!(%primary, "primary record is unstructured");
                Stored::Unstructured
            }
        })
    }

    // Apply `plan` for every index of `schema`. A non-ready index aborts the
    // whole call and the returned log rolls back on drop.
    fn stage<F>(
        &self,
        phase: &'static str,
        schema: &str,
        mut plan: F,
    ) -> Result<Staged<'_, S>, InternalError>
    where
        F: FnMut(&IndexMetadata) -> Result<Vec<CompensatingOp>, InternalError>,
    {
        let indexes = self.metadata().for_schema(schema)?;
        let mut log = CompensationLog::new(&self.store, self.config.request, phase);

        for meta in &indexes {
            if !meta.state.is_usable() {
                info!(
                    index = %meta.name,
                    state = %meta.state,
                    phase,
                    "maintenance blocked by index state"
                );
                sink::record(IndexEvent::MaintenanceRejected {
                    index: meta.name.clone(),
                    state: meta.state,
                });
                return Ok(None);
            }

            for op in plan(meta)? {
                log.apply(op)?;
            }
        }

        Ok(Some(log))
    }
}

fn commit<S: KvStore>(
    phase: &'static str,
    staged: Result<Staged<'_, S>, InternalError>,
) -> Result<bool, InternalError> {
    match staged {
        Ok(Some(log)) => {
            log.finish();
            Ok(true)
        }
        Ok(None) => Ok(false),
        Err(err) => soften(phase, err),
    }
}

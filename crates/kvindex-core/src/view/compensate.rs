use crate::{
    key::CompositeKey,
    obs::sink::{self, IndexEvent},
    store::{KvStore, RequestOptions, StoreError},
};
use std::mem;
use tracing::{debug, warn};

///
/// CompensatingOp
///
/// One index-entry mutation together with its inverse.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CompensatingOp {
    CreateEntry { index: String, key: CompositeKey },
    RemoveEntry { index: String, key: CompositeKey },
}

impl CompensatingOp {
    /// Apply the mutation; returns whether the store changed.
    pub fn apply<S: KvStore + ?Sized>(
        &self,
        store: &S,
        opts: &RequestOptions,
    ) -> Result<bool, StoreError> {
        match self {
            Self::CreateEntry { index, key } => create_entry(store, index, key, opts),
            Self::RemoveEntry { index, key } => remove_entry(store, index, key, opts),
        }
    }

    /// Apply the inverse mutation.
    pub fn undo<S: KvStore + ?Sized>(
        &self,
        store: &S,
        opts: &RequestOptions,
    ) -> Result<bool, StoreError> {
        match self {
            Self::CreateEntry { index, key } => remove_entry(store, index, key, opts),
            Self::RemoveEntry { index, key } => create_entry(store, index, key, opts),
        }
    }
}

pub(super) fn create_entry<S: KvStore + ?Sized>(
    store: &S,
    index: &str,
    key: &CompositeKey,
    opts: &RequestOptions,
) -> Result<bool, StoreError> {
    let created = store.put_if_absent(key, &[], opts)?.is_some();
    if created {
        sink::record(IndexEvent::EntryWritten {
            index: index.to_string(),
        });
    }

    Ok(created)
}

pub(super) fn remove_entry<S: KvStore + ?Sized>(
    store: &S,
    index: &str,
    key: &CompositeKey,
    opts: &RequestOptions,
) -> Result<bool, StoreError> {
    let removed = store.delete(key, opts)?;
    if removed {
        sink::record(IndexEvent::EntryRemoved {
            index: index.to_string(),
        });
    }

    Ok(removed)
}

///
/// CompensationLog
///
/// Guard over the index mutations of one maintenance call.
///
/// Only mutations that changed the store are logged. Unless `finish` runs,
/// dropping the log undoes them in reverse order, best effort: an undo that
/// fails is logged and skipped, leaving divergence for `check_index` to find.
///

pub(crate) struct CompensationLog<'a, S: KvStore + ?Sized> {
    store: &'a S,
    opts: RequestOptions,
    phase: &'static str,
    applied: Vec<CompensatingOp>,
    finished: bool,
}

impl<'a, S: KvStore + ?Sized> CompensationLog<'a, S> {
    pub(crate) const fn new(store: &'a S, opts: RequestOptions, phase: &'static str) -> Self {
        Self {
            store,
            opts,
            phase,
            applied: Vec::new(),
            finished: false,
        }
    }

    pub(crate) fn apply(&mut self, op: CompensatingOp) -> Result<(), StoreError> {
        if op.apply(self.store, &self.opts)? {
            self.applied.push(op);
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn len(&self) -> usize {
        self.applied.len()
    }

    /// Keep every applied mutation.
    pub(crate) fn finish(mut self) {
        self.finished = true;
        self.applied.clear();
    }

    fn rollback_best_effort(&mut self) {
        let applied = mem::take(&mut self.applied);
        if applied.is_empty() {
            return;
        }

        let mut undone = 0u64;
        let mut failed = 0u64;
        for op in applied.iter().rev() {
            match op.undo(self.store, &self.opts) {
                Ok(_) => undone += 1,
                Err(err) => {
                    failed += 1;
                    warn!(phase = self.phase, ?op, error = %err, "compensation step failed");
                }
            }
        }

        debug!(phase = self.phase, undone, failed, "index mutations compensated");
        sink::record(IndexEvent::Compensated { undone, failed });
    }
}

impl<S: KvStore + ?Sized> Drop for CompensationLog<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_best_effort();
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FaultPlan, MemoryStore};

    const OPTS: RequestOptions = RequestOptions {
        consistency: crate::store::Consistency::NoneRequired,
        timeout_ms: None,
    };

    fn entry(n: &str) -> CompositeKey {
        CompositeKey::from_major(["IndexView", "i", n]).with_minor([format!("/p/{n}")])
    }

    fn create(n: &str) -> CompensatingOp {
        CompensatingOp::CreateEntry {
            index: "i".to_string(),
            key: entry(n),
        }
    }

    #[test]
    fn dropped_log_undoes_in_reverse() {
        let store = MemoryStore::new();
        store.put(&entry("old"), &[], &OPTS).expect("seed");

        {
            let mut log = CompensationLog::new(&store, OPTS, "test");
            log.apply(create("a")).expect("a");
            log.apply(CompensatingOp::RemoveEntry {
                index: "i".to_string(),
                key: entry("old"),
            })
            .expect("remove");
            assert_eq!(log.len(), 2);
        }

        assert!(store.get(&entry("a"), &OPTS).expect("get").is_none());
        assert!(store.get(&entry("old"), &OPTS).expect("get").is_some());
    }

    #[test]
    fn finished_log_keeps_mutations() {
        let store = MemoryStore::new();

        let mut log = CompensationLog::new(&store, OPTS, "test");
        log.apply(create("a")).expect("a");
        log.finish();

        assert!(store.get(&entry("a"), &OPTS).expect("get").is_some());
    }

    #[test]
    fn unchanged_mutations_are_not_logged() {
        let store = MemoryStore::new();
        store.put(&entry("a"), &[], &OPTS).expect("seed");

        {
            let mut log = CompensationLog::new(&store, OPTS, "test");
            log.apply(create("a")).expect("a");
            assert_eq!(log.len(), 0);
        }

        // A pre-existing entry survives the rollback.
        assert!(store.get(&entry("a"), &OPTS).expect("get").is_some());
    }

    #[test]
    fn failed_apply_is_not_logged() {
        let store = MemoryStore::new();

        let mut log = CompensationLog::new(&store, OPTS, "test");
        log.apply(create("a")).expect("a");
        store.inject(FaultPlan::write(0));
        assert!(log.apply(create("b")).is_err());
        assert_eq!(log.len(), 1);
        drop(log);

        assert!(store.is_empty());
    }
}

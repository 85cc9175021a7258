//! In-process reference store.
//!
//! Backs tests and the CLI. Keys are kept in encoded order, so unordered
//! scans come back sorted; callers must not rely on that. Fault injection
//! simulates transient failures of a remote store.

use crate::{
    key::{CompositeKey, RawKey, encode_prefix},
    serialize,
    store::{
        EntryIter, KeyIter, KvStore, RequestOptions, ScanOrder, StoreError, StoredEntry, Version,
    },
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

///
/// FaultPlan
///
/// Injected transient failures. Counters start when the plan is installed.
/// A one-shot plan clears itself after its first fault; a sticky plan keeps
/// failing every matching call.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FaultPlan {
    /// Fail scan item number `n` (0-based, counted across scans).
    pub scan_item: Option<u64>,

    /// Fail write number `n` (0-based; puts and deletes).
    pub write: Option<u64>,

    pub sticky: bool,
}

impl FaultPlan {
    #[must_use]
    pub const fn scan_item(n: u64) -> Self {
        Self {
            scan_item: Some(n),
            write: None,
            sticky: false,
        }
    }

    #[must_use]
    pub const fn write(n: u64) -> Self {
        Self {
            scan_item: None,
            write: Some(n),
            sticky: false,
        }
    }

    #[must_use]
    pub const fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }
}

#[derive(Debug, Default)]
struct FaultState {
    plan: Option<FaultPlan>,
    scan_items: u64,
    writes: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Slot {
    #[serde(with = "serde_bytes")]
    value: Vec<u8>,
    version: u64,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct State {
    entries: BTreeMap<RawKey, Slot>,
    next_version: u64,
}

impl State {
    const fn bump(&mut self) -> Version {
        self.next_version += 1;
        Version(self.next_version)
    }
}

///
/// MemoryStore
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    faults: Mutex<FaultState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fault plan, resetting fault counters.
    pub fn inject(&self, plan: FaultPlan) {
        *self.faults() = FaultState {
            plan: Some(plan),
            ..FaultState::default()
        };
    }

    pub fn clear_faults(&self) {
        *self.faults() = FaultState::default();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Snapshot every entry in key order.
    pub fn entries(&self) -> Result<Vec<StoredEntry>, StoreError> {
        self.read()
            .entries
            .iter()
            .map(|(raw, slot)| {
                Ok(StoredEntry {
                    key: raw.decode()?,
                    value: slot.value.clone(),
                    version: Version(slot.version),
                })
            })
            .collect()
    }

    /// Write the whole store to `path` as CBOR.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let bytes = serialize::serialize(&*self.read())?;

        std::fs::write(path, bytes).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a store written by [`Self::save_to`]; a missing file yields an empty store.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let state: State = serialize::deserialize(&bytes)?;

        Ok(Self {
            state: RwLock::new(state),
            faults: Mutex::new(FaultState::default()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, FaultState> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick_write(&self) -> Result<(), StoreError> {
        let mut faults = self.faults();
        let n = faults.writes;
        faults.writes += 1;

        match faults.plan {
            Some(plan) if plan.write.is_some_and(|at| n >= at) => {
                if !plan.sticky {
                    faults.plan = None;
                }
                Err(StoreError::fault(format!("injected write fault at write {n}")))
            }
            _ => Ok(()),
        }
    }

    fn tick_scan(&self) -> Result<(), StoreError> {
        let mut faults = self.faults();
        let n = faults.scan_items;
        faults.scan_items += 1;

        match faults.plan {
            Some(plan) if plan.scan_item.is_some_and(|at| n >= at) => {
                if !plan.sticky {
                    faults.plan = None;
                }
                Err(StoreError::fault(format!("injected scan fault at item {n}")))
            }
            _ => Ok(()),
        }
    }

    // Materialize the matching range under the read lock so iteration never
    // holds it.
    fn collect_range(&self, prefix: &CompositeKey) -> Vec<(RawKey, Slot)> {
        let start = encode_prefix(prefix);

        self.read()
            .entries
            .range(start.clone()..)
            .take_while(|(raw, _)| raw.starts_with(&start))
            .map(|(raw, slot)| (raw.clone(), slot.clone()))
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn get(
        &self,
        key: &CompositeKey,
        _opts: &RequestOptions,
    ) -> Result<Option<(Vec<u8>, Version)>, StoreError> {
        Ok(self
            .read()
            .entries
            .get(&key.to_raw())
            .map(|slot| (slot.value.clone(), Version(slot.version))))
    }

    fn put_if_absent(
        &self,
        key: &CompositeKey,
        value: &[u8],
        _opts: &RequestOptions,
    ) -> Result<Option<Version>, StoreError> {
        self.tick_write()?;

        let raw = key.to_raw();
        let mut state = self.write();
        if state.entries.contains_key(&raw) {
            return Ok(None);
        }

        let version = state.bump();
        state.entries.insert(
            raw,
            Slot {
                value: value.to_vec(),
                version: version.0,
            },
        );

        Ok(Some(version))
    }

    fn put(
        &self,
        key: &CompositeKey,
        value: &[u8],
        _opts: &RequestOptions,
    ) -> Result<Version, StoreError> {
        self.tick_write()?;

        let mut state = self.write();
        let version = state.bump();
        state.entries.insert(
            key.to_raw(),
            Slot {
                value: value.to_vec(),
                version: version.0,
            },
        );

        Ok(version)
    }

    fn delete(&self, key: &CompositeKey, _opts: &RequestOptions) -> Result<bool, StoreError> {
        self.tick_write()?;

        Ok(self.write().entries.remove(&key.to_raw()).is_some())
    }

    fn scan_keys(
        &self,
        prefix: &CompositeKey,
        _order: ScanOrder,
        _opts: &RequestOptions,
    ) -> Result<KeyIter<'_>, StoreError> {
        let items = self.collect_range(prefix);

        Ok(Box::new(items.into_iter().map(move |(raw, _)| {
            self.tick_scan()?;
            Ok(raw.decode()?)
        })))
    }

    fn scan_entries(
        &self,
        prefix: &CompositeKey,
        _order: ScanOrder,
        _opts: &RequestOptions,
    ) -> Result<EntryIter<'_>, StoreError> {
        let items = self.collect_range(prefix);

        Ok(Box::new(items.into_iter().map(move |(raw, slot)| {
            self.tick_scan()?;
            Ok(StoredEntry {
                key: raw.decode()?,
                value: slot.value,
                version: Version(slot.version),
            })
        })))
    }

    fn multi_get_keys(
        &self,
        prefix: &CompositeKey,
        _opts: &RequestOptions,
    ) -> Result<Vec<CompositeKey>, StoreError> {
        self.collect_range(prefix)
            .into_iter()
            .map(|(raw, _)| Ok(raw.decode()?))
            .collect()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    const OPTS: RequestOptions = RequestOptions {
        consistency: crate::store::Consistency::NoneRequired,
        timeout_ms: None,
    };

    fn k(major: &[&str], minor: &[&str]) -> CompositeKey {
        CompositeKey::from_major(major.iter().copied()).with_minor(minor.iter().copied())
    }

    fn scan(store: &MemoryStore, prefix: &CompositeKey) -> Vec<CompositeKey> {
        store
            .scan_keys(prefix, ScanOrder::Forward, &OPTS)
            .expect("scan")
            .collect::<Result<_, _>>()
            .expect("scan items")
    }

    #[test]
    fn put_if_absent_only_writes_once() {
        let store = MemoryStore::new();
        let key = k(&["a"], &["1"]);

        assert!(store.put_if_absent(&key, b"x", &OPTS).expect("put").is_some());
        assert!(store.put_if_absent(&key, b"y", &OPTS).expect("put").is_none());
        assert_eq!(store.get(&key, &OPTS).expect("get").expect("present").0, b"x");
    }

    #[test]
    fn versions_increase_on_every_write() {
        let store = MemoryStore::new();
        let key = k(&["a"], &[]);

        let v1 = store.put(&key, b"1", &OPTS).expect("put");
        let v2 = store.put(&key, b"2", &OPTS).expect("put");
        assert!(v2 > v1);
    }

    #[test]
    fn scan_respects_segment_boundaries() {
        let store = MemoryStore::new();
        for key in [
            k(&["ab"], &[]),
            k(&["a"], &["x"]),
            k(&["a", "b"], &[]),
            k(&["a\0"], &[]),
        ] {
            store.put(&key, b"", &OPTS).expect("put");
        }

        assert_eq!(
            scan(&store, &k(&["a"], &[])),
            vec![k(&["a"], &["x"]), k(&["a", "b"], &[])]
        );
        assert_eq!(scan(&store, &k(&["a"], &["x"])), vec![k(&["a"], &["x"])]);
    }

    #[test]
    fn one_shot_write_fault_fires_once() {
        let store = MemoryStore::new();
        store.inject(FaultPlan::write(1));

        store.put(&k(&["a"], &[]), b"", &OPTS).expect("first write");
        let err = store.put(&k(&["b"], &[]), b"", &OPTS).unwrap_err();
        assert!(matches!(err, StoreError::Fault { .. }));
        store.put(&k(&["c"], &[]), b"", &OPTS).expect("plan cleared");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn scan_fault_surfaces_mid_iteration() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let id = i.to_string();
            store.put(&k(&["p", id.as_str()], &[]), b"", &OPTS).expect("put");
        }
        store.inject(FaultPlan::scan_item(3));

        let results: Vec<_> = store
            .scan_keys(&k(&["p"], &[]), ScanOrder::Unordered, &OPTS)
            .expect("scan")
            .collect();
        assert!(results[..3].iter().all(Result::is_ok));
        assert!(results[3].is_err());
    }

    #[test]
    fn snapshot_round_trips_through_file() {
        let store = MemoryStore::new();
        store.put(&k(&["a"], &["1"]), b"one", &OPTS).expect("put");
        store.put(&k(&["b"], &[]), b"two", &OPTS).expect("put");

        let path = std::env::temp_dir().join(format!(
            "kvindex-memory-store-{}.cbor",
            std::process::id()
        ));
        store.save_to(&path).expect("save");
        let loaded = MemoryStore::load_from(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.entries().expect("entries"), store.entries().expect("entries"));
        let v = loaded.put(&k(&["c"], &[]), b"", &OPTS).expect("put");
        assert_eq!(v, Version(3));
    }
}

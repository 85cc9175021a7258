//! Store contract consumed by the index layer.
//!
//! The engine needs exactly these primitives from an ordered composite-key
//! store. Every call and every scan item may fail with a transient
//! `StoreError::Fault`; callers decide whether to compensate.

mod memory;
mod options;

use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    key::{CompositeKey, KeyDecodeError},
    serialize::SerializeError,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error as ThisError;

pub use memory::{FaultPlan, MemoryStore};
pub use options::{Consistency, RequestOptions};

///
/// StoreError
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("store fault: {message}")]
    Fault { message: String },

    #[error("stored key is malformed: {0}")]
    MalformedKey(#[from] KeyDecodeError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SerializeError),

    #[error("snapshot io error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Fault { .. } => Self::store_fault(err.to_string()),
            StoreError::MalformedKey(inner) => inner.into(),
            StoreError::Snapshot(_) => Self::store_corruption(err.to_string()),
            StoreError::Io { .. } => {
                Self::new(ErrorClass::Internal, ErrorOrigin::Store, err.to_string())
            }
        }
    }
}

///
/// Version
///
/// Opaque, store-assigned version of one stored value.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[display("v{_0}")]
pub struct Version(pub u64);

///
/// ScanOrder
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanOrder {
    /// Any order; lets a sharded store stream partitions in parallel.
    Unordered,
    Forward,
}

///
/// StoredEntry
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredEntry {
    pub key: CompositeKey,
    pub value: Vec<u8>,
    pub version: Version,
}

pub type KeyIter<'a> = Box<dyn Iterator<Item = Result<CompositeKey, StoreError>> + 'a>;
pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<StoredEntry, StoreError>> + 'a>;

///
/// KvStore
///
/// Primitive operations on an ordered composite-key namespace. A scan
/// `prefix` selects every key `k` with `prefix.is_prefix_of(k)`.
///

pub trait KvStore: Send + Sync {
    fn get(
        &self,
        key: &CompositeKey,
        opts: &RequestOptions,
    ) -> Result<Option<(Vec<u8>, Version)>, StoreError>;

    /// Write only if absent; `None` when the key already exists.
    fn put_if_absent(
        &self,
        key: &CompositeKey,
        value: &[u8],
        opts: &RequestOptions,
    ) -> Result<Option<Version>, StoreError>;

    fn put(
        &self,
        key: &CompositeKey,
        value: &[u8],
        opts: &RequestOptions,
    ) -> Result<Version, StoreError>;

    /// Returns whether a value was removed.
    fn delete(&self, key: &CompositeKey, opts: &RequestOptions) -> Result<bool, StoreError>;

    fn scan_keys(
        &self,
        prefix: &CompositeKey,
        order: ScanOrder,
        opts: &RequestOptions,
    ) -> Result<KeyIter<'_>, StoreError>;

    fn scan_entries(
        &self,
        prefix: &CompositeKey,
        order: ScanOrder,
        opts: &RequestOptions,
    ) -> Result<EntryIter<'_>, StoreError>;

    /// Bounded key read under one complete major path (single shard).
    fn multi_get_keys(
        &self,
        prefix: &CompositeKey,
        opts: &RequestOptions,
    ) -> Result<Vec<CompositeKey>, StoreError>;
}

macro_rules! forward_kv_store {
    ($($ty:ty),*) => {$(
        impl<S: KvStore + ?Sized> KvStore for $ty {
            fn get(
                &self,
                key: &CompositeKey,
                opts: &RequestOptions,
            ) -> Result<Option<(Vec<u8>, Version)>, StoreError> {
                (**self).get(key, opts)
            }

            fn put_if_absent(
                &self,
                key: &CompositeKey,
                value: &[u8],
                opts: &RequestOptions,
            ) -> Result<Option<Version>, StoreError> {
                (**self).put_if_absent(key, value, opts)
            }

            fn put(
                &self,
                key: &CompositeKey,
                value: &[u8],
                opts: &RequestOptions,
            ) -> Result<Version, StoreError> {
                (**self).put(key, value, opts)
            }

            fn delete(&self, key: &CompositeKey, opts: &RequestOptions) -> Result<bool, StoreError> {
                (**self).delete(key, opts)
            }

            fn scan_keys(
                &self,
                prefix: &CompositeKey,
                order: ScanOrder,
                opts: &RequestOptions,
            ) -> Result<KeyIter<'_>, StoreError> {
                (**self).scan_keys(prefix, order, opts)
            }

            fn scan_entries(
                &self,
                prefix: &CompositeKey,
                order: ScanOrder,
                opts: &RequestOptions,
            ) -> Result<EntryIter<'_>, StoreError> {
                (**self).scan_entries(prefix, order, opts)
            }

            fn multi_get_keys(
                &self,
                prefix: &CompositeKey,
                opts: &RequestOptions,
            ) -> Result<Vec<CompositeKey>, StoreError> {
                (**self).multi_get_keys(prefix, opts)
            }
        }
    )*};
}

forward_kv_store!(&S, Arc<S>);

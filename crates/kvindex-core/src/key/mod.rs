//! Composite keys: ordered major/minor path segments and their storage forms.
//!
//! Invariants:
//! - `CompositeKey` ordering is segment-wise, major path first, then minor.
//! - `RawKey` byte ordering matches `CompositeKey` ordering exactly.
//! - Segment contents are never interpreted; any string is a valid segment.

mod codec;
mod path;

#[cfg(test)]
mod tests;

use crate::error::InternalError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

pub use codec::{decode, encode, encode_prefix};
pub use path::parse_path;

///
/// KeyDecodeError
///
/// Structural failures while decoding a stored or user-supplied key.
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum KeyDecodeError {
    #[error("unexpected end of key at byte {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("invalid segment tag 0x{tag:02x} at byte {offset}")]
    InvalidTag { tag: u8, offset: usize },

    #[error("invalid escape byte 0x{byte:02x} at byte {offset}")]
    InvalidEscape { byte: u8, offset: usize },

    #[error("missing major/minor boundary")]
    MissingBoundary,

    #[error("segment is not valid utf-8")]
    InvalidUtf8,

    #[error("invalid key path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

impl From<KeyDecodeError> for InternalError {
    fn from(err: KeyDecodeError) -> Self {
        Self::new(
            crate::error::ErrorClass::Corruption,
            crate::error::ErrorOrigin::Key,
            format!("malformed key: {err}"),
        )
    }
}

///
/// CompositeKey
///
/// Hierarchical key: a `major` path shared by colocated records and a
/// `minor` path addressing sub-records under it.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CompositeKey {
    major: Vec<String>,
    minor: Vec<String>,
}

impl CompositeKey {
    #[must_use]
    pub const fn new(major: Vec<String>, minor: Vec<String>) -> Self {
        Self { major, minor }
    }

    /// Build a key with only major segments.
    pub fn from_major<I, S>(major: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            major: major.into_iter().map(Into::into).collect(),
            minor: Vec::new(),
        }
    }

    /// Replace the minor path.
    #[must_use]
    pub fn with_minor<I, S>(mut self, minor: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.minor = minor.into_iter().map(Into::into).collect();
        self
    }

    /// Append one major segment.
    #[must_use]
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.major.push(segment.into());
        self
    }

    #[must_use]
    pub fn major(&self) -> &[String] {
        &self.major
    }

    #[must_use]
    pub fn minor(&self) -> &[String] {
        &self.minor
    }

    /// First major segment, used to tell reserved namespaces apart.
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        self.major.first().map(String::as_str)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.major.is_empty() && self.minor.is_empty()
    }

    /// True when `full` lies under `self`.
    ///
    /// The major/minor boundary is part of the path: a candidate with minor
    /// segments only matches keys with an identical major path.
    #[must_use]
    pub fn is_prefix_of(&self, full: &Self) -> bool {
        if self.minor.is_empty() {
            return full.major.starts_with(&self.major);
        }

        self.major == full.major && full.minor.starts_with(&self.minor)
    }

    /// Human-readable `/major/.../-/minor/...` form.
    #[must_use]
    pub fn to_path_string(&self) -> String {
        path::to_path_string(self)
    }

    #[must_use]
    pub fn to_raw(&self) -> RawKey {
        encode(self)
    }
}

impl Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path_string())
    }
}

///
/// RawKey
///
/// Order-preserving byte form of a `CompositeKey`; the form the store sorts.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RawKey(#[serde(with = "serde_bytes")] Vec<u8>);

impl RawKey {
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn decode(&self) -> Result<CompositeKey, KeyDecodeError> {
        decode(self)
    }
}

//! Engine configuration: namespace prefixes, limits, and pass-through request
//! options. Loaded from TOML; every field has a default.

use crate::{error::InternalError, store::RequestOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;

pub const DEFAULT_INDEX_PREFIX: &str = "IndexView";
pub const DEFAULT_METADATA_PREFIX: &str = "IndexMeta";
pub const DEFAULT_MAX_INDEX_FIELDS: usize = 4;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::config_unsupported(err.to_string())
    }
}

///
/// EngineConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Root major segment of every index entry.
    pub index_prefix: String,

    /// Root major segment of every metadata record.
    pub metadata_prefix: String,

    /// Root major segment of primary records; `None` scans the whole keyspace
    /// minus the reserved prefixes.
    pub data_prefix: Option<String>,

    pub max_index_fields: usize,

    pub request: RequestOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            data_prefix: None,
            max_index_fields: DEFAULT_MAX_INDEX_FIELDS,
            request: RequestOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    /// Reserved prefixes must be non-empty and pairwise distinct.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_prefix.is_empty() || self.metadata_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "index and metadata prefixes must be non-empty".to_string(),
            ));
        }
        if self.index_prefix == self.metadata_prefix {
            return Err(ConfigError::Invalid(format!(
                "index and metadata prefixes must differ (both '{}')",
                self.index_prefix
            )));
        }
        if let Some(data) = &self.data_prefix
            && (data == &self.index_prefix || data == &self.metadata_prefix)
        {
            return Err(ConfigError::Invalid(format!(
                "data prefix '{data}' collides with a reserved prefix"
            )));
        }
        if self.max_index_fields == 0 {
            return Err(ConfigError::Invalid(
                "max_index_fields must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// True when `root` names the index or metadata namespace.
    #[must_use]
    pub fn is_reserved_root(&self, root: &str) -> bool {
        root == self.index_prefix || root == self.metadata_prefix
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Consistency;

    #[test]
    fn empty_source_yields_defaults() {
        let config = EngineConfig::from_toml_str("").expect("parse");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_toml_str(
            r#"
            index_prefix = "idx"
            data_prefix = "people"
            max_index_fields = 2

            [request]
            consistency = "absolute"
            timeout_ms = 250
            "#,
        )
        .expect("parse");

        assert_eq!(config.index_prefix, "idx");
        assert_eq!(config.metadata_prefix, DEFAULT_METADATA_PREFIX);
        assert_eq!(config.data_prefix.as_deref(), Some("people"));
        assert_eq!(config.max_index_fields, 2);
        assert_eq!(config.request.consistency, Consistency::Absolute);
        assert_eq!(config.request.timeout_ms, Some(250));
    }

    #[test]
    fn colliding_prefixes_are_rejected() {
        let err = EngineConfig::from_toml_str(r#"metadata_prefix = "IndexView""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_toml_str(r#"data_prefix = "IndexMeta""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("index_prefx = \"oops\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

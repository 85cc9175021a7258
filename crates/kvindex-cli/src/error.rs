use kvindex_core::{
    binding::{BindingError, FieldKind},
    config::ConfigError,
    error::InternalError,
    key::KeyDecodeError,
    metadata::MetadataError,
    store::StoreError,
};
use std::path::PathBuf;
use thiserror::Error as ThisError;

///
/// CliError
///

#[derive(Debug, ThisError)]
pub enum CliError {
    #[error("{}", .0.display_with_class())]
    Engine(#[from] InternalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("bad key: {0}")]
    Key(#[from] KeyDecodeError),

    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown schema '{0}'")]
    UnknownSchema(String),

    #[error("field '{field}': expected {kind}, got {literal}")]
    BadValue {
        field: String,
        kind: FieldKind,
        literal: String,
    },

    #[error("{0}")]
    Usage(String),
}

//! Record binding: structured record bytes <-> named field values.
//!
//! Structured records are a magic prefix followed by a CBOR envelope naming
//! the schema. Anything without the prefix is treated as legacy raw bytes and
//! decodes to `None`.

mod schema;
mod value;

#[cfg(test)]
mod tests;

use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    serialize::{self, SerializeError},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error as ThisError;

pub use schema::{FieldDef, Schema, SchemaRegistry};
pub use value::{FieldKind, FieldValue};

/// Prefix marking a value as a structured record.
pub const RECORD_MAGIC: &[u8; 4] = b"KVR1";

/// Upper bound on envelope bytes accepted by `decode`.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

/// Field name -> value, ordered by name.
pub type FieldMap = BTreeMap<String, FieldValue>;

///
/// BindingError
///

#[derive(Debug, ThisError)]
pub enum BindingError {
    #[error("unknown schema '{schema}'")]
    UnknownSchema { schema: String },

    #[error("schema '{schema}' has no field '{field}'")]
    MissingField { schema: String, field: String },

    #[error("field '{field}' of schema '{schema}' expects {expected}, found {found}")]
    KindMismatch {
        schema: String,
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("corrupt record envelope: {0}")]
    CorruptEnvelope(SerializeError),

    #[error("record encode failed: {0}")]
    Encode(SerializeError),
}

impl From<BindingError> for InternalError {
    fn from(err: BindingError) -> Self {
        let class = match err {
            BindingError::UnknownSchema { .. }
            | BindingError::MissingField { .. }
            | BindingError::KindMismatch { .. } => ErrorClass::Unsupported,
            BindingError::CorruptEnvelope(_) => ErrorClass::Corruption,
            BindingError::Encode(_) => ErrorClass::Internal,
        };

        Self::new(class, ErrorOrigin::Binding, err.to_string())
    }
}

///
/// DecodedRecord
///

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRecord {
    pub schema: String,
    pub fields: FieldMap,
}

#[derive(Deserialize, Serialize)]
struct RecordEnvelope {
    schema: String,
    fields: FieldMap,
}

///
/// RecordBinding
///
/// Pure transform over an immutable schema registry.
///

#[derive(Clone, Debug)]
pub struct RecordBinding {
    registry: Arc<SchemaRegistry>,
}

impl RecordBinding {
    #[must_use]
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Decode a stored value; `Ok(None)` when it is not a structured record.
    pub fn decode(&self, value: &[u8]) -> Result<Option<DecodedRecord>, BindingError> {
        let Some(body) = value.strip_prefix(RECORD_MAGIC.as_slice()) else {
            return Ok(None);
        };

        let envelope: RecordEnvelope = serialize::deserialize_bounded(body, MAX_RECORD_BYTES)
            .map_err(BindingError::CorruptEnvelope)?;
        self.check_fields(&envelope.schema, &envelope.fields)?;

        Ok(Some(DecodedRecord {
            schema: envelope.schema,
            fields: envelope.fields,
        }))
    }

    /// Encode named fields as a structured record of `schema`.
    pub fn encode(&self, schema: &str, fields: &FieldMap) -> Result<Vec<u8>, BindingError> {
        self.check_fields(schema, fields)?;

        let envelope = RecordEnvelope {
            schema: schema.to_string(),
            fields: fields.clone(),
        };
        let body = serialize::serialize(&envelope).map_err(BindingError::Encode)?;

        let mut out = Vec::with_capacity(RECORD_MAGIC.len() + body.len());
        out.extend_from_slice(RECORD_MAGIC);
        out.extend_from_slice(&body);

        Ok(out)
    }

    /// Extract `field_names` in order; `Ok(None)` when the value is not structured.
    pub fn extract_fields(
        &self,
        value: &[u8],
        field_names: &[String],
    ) -> Result<Option<Vec<FieldValue>>, BindingError> {
        let Some(record) = self.decode(value)? else {
            return Ok(None);
        };

        self.extract_from(&record, field_names).map(Some)
    }

    /// Extract `field_names` from an already decoded record.
    ///
    /// Declared fields absent from the record come back as `Null`.
    pub fn extract_from(
        &self,
        record: &DecodedRecord,
        field_names: &[String],
    ) -> Result<Vec<FieldValue>, BindingError> {
        self.check_field_names(&record.schema, field_names)?;

        Ok(field_names
            .iter()
            .map(|name| {
                record
                    .fields
                    .get(name)
                    .cloned()
                    .unwrap_or(FieldValue::Null)
            })
            .collect())
    }

    /// Verify that `schema` is registered and declares every name.
    pub fn check_field_names(
        &self,
        schema: &str,
        field_names: &[String],
    ) -> Result<(), BindingError> {
        let def = self.schema(schema)?;

        for name in field_names {
            if def.field(name).is_none() {
                return Err(BindingError::MissingField {
                    schema: schema.to_string(),
                    field: name.clone(),
                });
            }
        }

        Ok(())
    }

    fn schema(&self, schema: &str) -> Result<&Schema, BindingError> {
        self.registry
            .get(schema)
            .ok_or_else(|| BindingError::UnknownSchema {
                schema: schema.to_string(),
            })
    }

    fn check_fields(&self, schema: &str, fields: &FieldMap) -> Result<(), BindingError> {
        let def = self.schema(schema)?;

        for (name, value) in fields {
            let Some(field) = def.field(name) else {
                return Err(BindingError::MissingField {
                    schema: schema.to_string(),
                    field: name.clone(),
                });
            };

            if let Some(found) = value.kind()
                && found != field.kind
            {
                return Err(BindingError::KindMismatch {
                    schema: schema.to_string(),
                    field: name.clone(),
                    expected: field.kind,
                    found,
                });
            }
        }

        Ok(())
    }
}

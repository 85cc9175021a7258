//! JSON <-> field value conversion for CLI input and output.

use crate::error::CliError;
use kvindex_core::binding::{FieldKind, FieldMap, FieldValue, Schema};
use serde::Deserialize;
use serde_json::{Map, Number, Value, json};

///
/// LoadRecord
///

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadRecord {
    pub key: String,
    pub schema: String,
    pub fields: Map<String, Value>,
}

/// Built-in `Person` records used by `load` without a file.
pub fn sample_people() -> Vec<LoadRecord> {
    [
        (1, "Jameson", "Bob", "Oslo", 42),
        (2, "Jameson", "Ann", "Bergen", 39),
        (3, "Smith", "Bob", "Oslo", 25),
        (4, "Nguyen", "Linh", "Hanoi", 31),
    ]
    .into_iter()
    .map(|(id, last, first, city, age)| LoadRecord {
        key: format!("/Person/{id}"),
        schema: "Person".to_string(),
        fields: match json!({
            "id": id,
            "lastName": last,
            "firstName": first,
            "city": city,
            "age": age,
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    })
    .collect()
}

/// Convert a JSON object to fields of `schema`, by declared kind.
pub fn fields_from_object(
    schema: &Schema,
    object: &Map<String, Value>,
) -> Result<FieldMap, CliError> {
    object
        .iter()
        .map(|(name, value)| {
            let field = schema.field(name).ok_or_else(|| {
                CliError::Usage(format!("schema '{}' has no field '{name}'", schema.name))
            })?;

            Ok((name.clone(), from_json(name, field.kind, value)?))
        })
        .collect()
}

pub fn fields_from_json(schema: &Schema, source: &str) -> Result<FieldMap, CliError> {
    match serde_json::from_str(source)? {
        Value::Object(object) => fields_from_object(schema, &object),
        other => Err(CliError::Usage(format!(
            "expected a JSON object of fields, got {other}"
        ))),
    }
}

/// Parse query literals by the declared kind of each field.
pub fn parse_literals(
    schema: &Schema,
    fields: &[String],
    literals: &[String],
) -> Result<Vec<FieldValue>, CliError> {
    if fields.len() != literals.len() {
        return Err(CliError::Usage(format!(
            "{} fields but {} values",
            fields.len(),
            literals.len()
        )));
    }

    fields
        .iter()
        .zip(literals)
        .map(|(name, literal)| {
            let field = schema.field(name).ok_or_else(|| {
                CliError::Usage(format!("schema '{}' has no field '{name}'", schema.name))
            })?;

            FieldValue::parse(field.kind, literal).ok_or_else(|| CliError::BadValue {
                field: name.clone(),
                kind: field.kind,
                literal: literal.clone(),
            })
        })
        .collect()
}

pub fn fields_to_json(fields: &FieldMap) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.clone(), to_json(value)))
            .collect(),
    )
}

fn to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(v) => Value::String(v.clone()),
        FieldValue::Int(v) => Value::Number((*v).into()),
        FieldValue::Float(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        FieldValue::Bool(v) => Value::Bool(*v),
        FieldValue::Null => Value::Null,
    }
}

fn from_json(name: &str, kind: FieldKind, value: &Value) -> Result<FieldValue, CliError> {
    let converted = match (kind, value) {
        (_, Value::Null) => Some(FieldValue::Null),
        (FieldKind::Text, Value::String(v)) => Some(FieldValue::Text(v.clone())),
        (FieldKind::Int, Value::Number(v)) => v.as_i64().map(FieldValue::Int),
        (FieldKind::Float, Value::Number(v)) => v.as_f64().map(FieldValue::Float),
        (FieldKind::Bool, Value::Bool(v)) => Some(FieldValue::Bool(*v)),
        _ => None,
    };

    converted.ok_or_else(|| CliError::BadValue {
        field: name.to_string(),
        kind,
        literal: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fields_follow_declared_kinds() {
        let fields = fields_from_json(
            &Schema::person(),
            r#"{ "id": 7, "lastName": "Jameson", "city": null }"#,
        )
        .expect("fields");

        assert_eq!(fields["id"], FieldValue::Int(7));
        assert_eq!(fields["lastName"], FieldValue::from("Jameson"));
        assert_eq!(fields["city"], FieldValue::Null);
        assert_eq!(
            fields_to_json(&fields),
            json!({ "id": 7, "lastName": "Jameson", "city": null })
        );
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let err = fields_from_json(&Schema::person(), r#"{ "age": "old" }"#).unwrap_err();
        assert!(matches!(err, CliError::BadValue { kind: FieldKind::Int, .. }));

        let err = fields_from_json(&Schema::person(), r#"{ "nickname": "x" }"#).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn literals_parse_by_kind() {
        let values = parse_literals(
            &Schema::person(),
            &["lastName".to_string(), "age".to_string()],
            &["Jameson".to_string(), "42".to_string()],
        )
        .expect("values");

        assert_eq!(values, [FieldValue::from("Jameson"), FieldValue::Int(42)]);
    }

    #[test]
    fn sample_people_match_the_person_schema() {
        for record in sample_people() {
            fields_from_object(&Schema::person(), &record.fields).expect("sample fields");
        }
    }
}

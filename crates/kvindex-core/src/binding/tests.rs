use crate::binding::{
    BindingError, FieldKind, FieldMap, FieldValue, RECORD_MAGIC, RecordBinding, Schema,
    SchemaRegistry,
};

fn binding() -> RecordBinding {
    RecordBinding::new(SchemaRegistry::new([
        Schema::person(),
        Schema::new("Bill")
            .with_field("account", FieldKind::Text)
            .with_field("amount", FieldKind::Float),
    ]))
}

fn person(id: i64, last: &str, first: &str) -> FieldMap {
    FieldMap::from([
        ("id".to_string(), FieldValue::Int(id)),
        ("lastName".to_string(), FieldValue::from(last)),
        ("firstName".to_string(), FieldValue::from(first)),
    ])
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[test]
fn decode_reports_schema_and_fields() {
    let binding = binding();
    let bytes = binding
        .encode("Person", &person(1, "Jameson", "Bob"))
        .expect("encode");
    assert!(bytes.starts_with(RECORD_MAGIC));

    let record = binding.decode(&bytes).expect("decode").expect("structured");
    assert_eq!(record.schema, "Person");
    assert_eq!(record.fields, person(1, "Jameson", "Bob"));
}

#[test]
fn legacy_bytes_decode_to_none() {
    let binding = binding();
    assert!(binding.decode(b"plain old bytes").expect("decode").is_none());
    assert!(
        binding
            .extract_fields(b"", &names(&["lastName"]))
            .expect("extract")
            .is_none()
    );
}

#[test]
fn encode_rejects_unknown_schema() {
    let err = binding().encode("Ghost", &FieldMap::new()).unwrap_err();
    assert!(matches!(err, BindingError::UnknownSchema { schema } if schema == "Ghost"));
}

#[test]
fn encode_rejects_kind_mismatch() {
    let mut fields = person(1, "Jameson", "Bob");
    fields.insert("age".to_string(), FieldValue::from("old"));
    let err = binding().encode("Person", &fields).unwrap_err();
    assert!(matches!(
        err,
        BindingError::KindMismatch {
            expected: FieldKind::Int,
            found: FieldKind::Text,
            ..
        }
    ));
}

#[test]
fn extract_preserves_requested_order() {
    let binding = binding();
    let bytes = binding
        .encode("Person", &person(7, "Ng", "Ann"))
        .expect("encode");

    let values = binding
        .extract_fields(&bytes, &names(&["firstName", "lastName", "city"]))
        .expect("extract")
        .expect("structured");

    assert_eq!(
        values,
        vec![
            FieldValue::from("Ann"),
            FieldValue::from("Ng"),
            FieldValue::Null
        ]
    );
}

#[test]
fn extract_fails_on_field_missing_from_schema() {
    let binding = binding();
    let bytes = binding
        .encode("Person", &person(7, "Ng", "Ann"))
        .expect("encode");

    let err = binding
        .extract_fields(&bytes, &names(&["lastName", "shoeSize"]))
        .unwrap_err();
    assert!(matches!(err, BindingError::MissingField { field, .. } if field == "shoeSize"));
}

#[test]
fn truncated_envelope_is_corrupt() {
    let binding = binding();
    let mut bytes = binding
        .encode("Person", &person(1, "Jameson", "Bob"))
        .expect("encode");
    bytes.truncate(RECORD_MAGIC.len() + 3);

    let err = binding.decode(&bytes).unwrap_err();
    assert!(matches!(err, BindingError::CorruptEnvelope(_)));
}

use crate::key::{CompositeKey, KeyDecodeError, RawKey, decode, encode, encode_prefix, parse_path};
use proptest::prelude::*;

fn key(major: &[&str], minor: &[&str]) -> CompositeKey {
    CompositeKey::from_major(major.iter().copied()).with_minor(minor.iter().copied())
}

#[test]
fn decode_inverts_encode_for_separator_laden_segments() {
    let original = key(&["Person", "a/b", "\0", "-"], &["x\u{1}y", ""]);
    let decoded = decode(&encode(&original)).expect("decode");
    assert_eq!(decoded, original);
}

#[test]
fn shorter_major_sorts_before_its_extension() {
    let parent = key(&["a"], &["z"]);
    let child = key(&["a", "b"], &[]);
    assert!(parent < child);
    assert!(encode(&parent) < encode(&child));
}

#[test]
fn containment_does_not_imply_prefix() {
    let candidate = key(&["ab"], &[]);
    let full = key(&["abc"], &[]);
    assert!(!candidate.is_prefix_of(&full));
    assert!(!encode(&full).starts_with(&encode_prefix(&candidate)));
}

#[test]
fn minor_candidate_requires_identical_major() {
    let candidate = key(&["a"], &["b"]);
    assert!(candidate.is_prefix_of(&key(&["a"], &["b", "c"])));
    assert!(!candidate.is_prefix_of(&key(&["a", "b"], &[])));
}

#[test]
fn decode_rejects_missing_boundary() {
    let mut bytes = encode(&key(&["a"], &[])).as_bytes().to_vec();
    bytes.pop();
    let err = decode(&RawKey::from_bytes(bytes)).unwrap_err();
    assert_eq!(err, KeyDecodeError::MissingBoundary);
}

#[test]
fn decode_rejects_unknown_tag() {
    let err = decode(&RawKey::from_bytes(vec![0x07, 0x01])).unwrap_err();
    assert_eq!(err, KeyDecodeError::InvalidTag { tag: 0x07, offset: 0 });
}

#[test]
fn decode_rejects_unterminated_segment() {
    let err = decode(&RawKey::from_bytes(vec![0x02, b'a'])).unwrap_err();
    assert!(matches!(err, KeyDecodeError::UnexpectedEnd { .. }));
}

#[test]
fn decode_rejects_bad_escape() {
    let err = decode(&RawKey::from_bytes(vec![0x02, b'a', 0x00, 0x09, 0x01])).unwrap_err();
    assert!(matches!(err, KeyDecodeError::InvalidEscape { byte: 0x09, .. }));
}

#[test]
fn path_string_escapes_reserved_characters() {
    let k = key(&["Person", "50%/off", "-"], &["id"]);
    assert_eq!(k.to_path_string(), "/Person/50%25%2Foff/%2D/-/id");
    assert_eq!(parse_path(&k.to_path_string()).expect("parse"), k);
}

#[test]
fn empty_key_path_round_trips() {
    let empty = CompositeKey::default();
    assert_eq!(empty.to_path_string(), "/-");
    assert_eq!(parse_path("/-").expect("parse"), empty);
    assert_eq!(parse_path("/").expect("parse"), key(&[""], &[]));
}

#[test]
fn parse_path_rejects_relative_and_double_marker() {
    assert!(parse_path("Person/1").is_err());
    assert!(parse_path("/a/-/b/-/c").is_err());
    assert!(parse_path("/a/-").is_err());
    assert!(parse_path("/a/%zz").is_err());
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{0,4}",
        Just("\0".to_string()),
        Just("/".to_string()),
        Just("-".to_string()),
        "[\\x00-\\x03a%/-]{0,3}",
    ]
}

fn composite() -> impl Strategy<Value = CompositeKey> {
    (
        prop::collection::vec(segment(), 1..4),
        prop::collection::vec(segment(), 0..3),
    )
        .prop_map(|(major, minor)| CompositeKey::new(major, minor))
}

proptest! {
    #[test]
    fn byte_order_matches_key_order(a in composite(), b in composite()) {
        prop_assert_eq!(a.cmp(&b), encode(&a).cmp(&encode(&b)));
    }

    #[test]
    fn byte_prefix_matches_is_prefix_of(a in composite(), b in composite()) {
        prop_assert_eq!(
            a.is_prefix_of(&b),
            encode(&b).starts_with(&encode_prefix(&a))
        );
    }

    #[test]
    fn path_string_round_trips(k in composite()) {
        prop_assert_eq!(parse_path(&k.to_path_string()).expect("parse"), k);
    }
}

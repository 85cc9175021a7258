//! Deterministic index names.
#![expect(clippy::cast_possible_truncation)]

use sha2::{Digest, Sha256};

/// Domain separator; bump if the hashed envelope changes.
const INDEX_NAME_DOMAIN_TAG: &[u8] = b"kvindex:index-name:v1";

/// Number of digest bytes kept in the hex name.
const INDEX_NAME_BYTES: usize = 16;

///
/// Fingerprint of `(schema, fields)`.
///
/// Order-sensitive in `fields`; every string is length-framed so that no
/// two distinct inputs share a hash stream.
///

#[must_use]
pub fn index_name(schema: &str, fields: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(INDEX_NAME_DOMAIN_TAG);
    write_str(&mut hasher, schema);
    write_u32(&mut hasher, fields.len() as u32);
    for field in fields {
        write_str(&mut hasher, field);
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(INDEX_NAME_BYTES * 2);
    for byte in &digest[..INDEX_NAME_BYTES] {
        out.push(hex_nibble(byte >> 4));
        out.push(hex_nibble(byte & 0x0f));
    }

    out
}

fn write_u32(hasher: &mut Sha256, v: u32) {
    hasher.update(v.to_be_bytes());
}

fn write_str(hasher: &mut Sha256, s: &str) {
    write_u32(hasher, s.len() as u32);
    hasher.update(s.as_bytes());
}

const fn hex_nibble(n: u8) -> char {
    match n {
        0..=9 => (b'0' + n) as char,
        _ => (b'a' + n - 10) as char,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn name_is_deterministic_and_hex() {
        let a = index_name("Person", &fields(&["lastName", "firstName"]));
        let b = index_name("Person", &fields(&["lastName", "firstName"]));

        assert_eq!(a, b);
        assert_eq!(a.len(), INDEX_NAME_BYTES * 2);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn name_is_order_sensitive() {
        assert_ne!(
            index_name("Person", &fields(&["lastName", "firstName"])),
            index_name("Person", &fields(&["firstName", "lastName"])),
        );
    }

    #[test]
    fn framing_separates_schema_from_fields() {
        assert_ne!(
            index_name("Pers", &fields(&["onlastName"])),
            index_name("Person", &fields(&["lastName"])),
        );
        assert_ne!(
            index_name("Person", &fields(&["ab", "c"])),
            index_name("Person", &fields(&["a", "bc"])),
        );
    }
}

use crate::key::{CompositeKey, KeyDecodeError, RawKey};

// Layout: SEGMENT* MAJOR_END SEGMENT*
// SEGMENT = SEGMENT_TAG escaped-bytes NUL END_OF_SEGMENT, where a content NUL
// is written as NUL ESCAPE. The two-byte terminator keeps segment encodings
// prefix-free, and MAJOR_END < SEGMENT_TAG sorts a shorter major path first.
const NUL: u8 = 0x00;
const END_OF_SEGMENT: u8 = 0x01;
const MAJOR_END: u8 = 0x01;
const SEGMENT_TAG: u8 = 0x02;
const ESCAPE: u8 = 0xFF;

/// Encode a key so byte order matches `CompositeKey` order.
#[must_use]
pub fn encode(key: &CompositeKey) -> RawKey {
    let mut out = Vec::with_capacity(encoded_len_hint(key));

    for segment in key.major() {
        push_segment(&mut out, segment);
    }
    out.push(MAJOR_END);
    for segment in key.minor() {
        push_segment(&mut out, segment);
    }

    RawKey(out)
}

/// Encode the byte prefix shared by every key that `key.is_prefix_of`.
///
/// A major-only key omits the boundary so deeper major paths still match.
#[must_use]
pub fn encode_prefix(key: &CompositeKey) -> RawKey {
    if key.minor().is_empty() {
        let mut out = Vec::with_capacity(encoded_len_hint(key));
        for segment in key.major() {
            push_segment(&mut out, segment);
        }
        return RawKey(out);
    }

    encode(key)
}

/// Decode bytes produced by [`encode`].
pub fn decode(raw: &RawKey) -> Result<CompositeKey, KeyDecodeError> {
    let bytes = raw.as_bytes();
    let mut offset = 0;
    let mut major = Vec::new();

    loop {
        match bytes.get(offset) {
            None => return Err(KeyDecodeError::MissingBoundary),
            Some(&MAJOR_END) => {
                offset += 1;
                break;
            }
            Some(&SEGMENT_TAG) => {
                let (segment, next) = read_segment(bytes, offset + 1)?;
                major.push(segment);
                offset = next;
            }
            Some(&tag) => return Err(KeyDecodeError::InvalidTag { tag, offset }),
        }
    }

    let mut minor = Vec::new();
    while let Some(&tag) = bytes.get(offset) {
        if tag != SEGMENT_TAG {
            return Err(KeyDecodeError::InvalidTag { tag, offset });
        }
        let (segment, next) = read_segment(bytes, offset + 1)?;
        minor.push(segment);
        offset = next;
    }

    Ok(CompositeKey::new(major, minor))
}

fn push_segment(out: &mut Vec<u8>, segment: &str) {
    out.push(SEGMENT_TAG);
    for &byte in segment.as_bytes() {
        out.push(byte);
        if byte == NUL {
            out.push(ESCAPE);
        }
    }
    out.push(NUL);
    out.push(END_OF_SEGMENT);
}

// Returns the decoded segment and the offset just past its terminator.
fn read_segment(bytes: &[u8], start: usize) -> Result<(String, usize), KeyDecodeError> {
    let mut buf = Vec::new();
    let mut offset = start;

    loop {
        let Some(&byte) = bytes.get(offset) else {
            return Err(KeyDecodeError::UnexpectedEnd { offset });
        };

        if byte != NUL {
            buf.push(byte);
            offset += 1;
            continue;
        }

        match bytes.get(offset + 1) {
            Some(&ESCAPE) => {
                buf.push(NUL);
                offset += 2;
            }
            Some(&END_OF_SEGMENT) => break,
            None => return Err(KeyDecodeError::UnexpectedEnd { offset: offset + 1 }),
            Some(&other) => {
                return Err(KeyDecodeError::InvalidEscape {
                    byte: other,
                    offset: offset + 1,
                });
            }
        }
    }

    let segment = String::from_utf8(buf).map_err(|_| KeyDecodeError::InvalidUtf8)?;

    Ok((segment, offset + 2))
}

fn encoded_len_hint(key: &CompositeKey) -> usize {
    key.major()
        .iter()
        .chain(key.minor())
        .map(|s| s.len() + 3)
        .sum::<usize>()
        + 1
}

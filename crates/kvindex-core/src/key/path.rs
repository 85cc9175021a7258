use crate::key::{CompositeKey, KeyDecodeError};

const SEPARATOR: char = '/';
const MINOR_MARKER: &str = "-";

pub(super) fn to_path_string(key: &CompositeKey) -> String {
    let mut out = String::new();

    for segment in key.major() {
        out.push(SEPARATOR);
        push_escaped(&mut out, segment);
    }

    // The empty key keeps a bare marker so it still parses.
    if !key.minor().is_empty() || key.major().is_empty() {
        out.push(SEPARATOR);
        out.push_str(MINOR_MARKER);
        for segment in key.minor() {
            out.push(SEPARATOR);
            push_escaped(&mut out, segment);
        }
    }

    out
}

/// Parse the `/major/.../-/minor/...` form produced by
/// [`CompositeKey::to_path_string`].
pub fn parse_path(path: &str) -> Result<CompositeKey, KeyDecodeError> {
    let invalid = |reason| KeyDecodeError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    let Some(body) = path.strip_prefix(SEPARATOR) else {
        return Err(invalid("path must start with '/'"));
    };

    let mut major = Vec::new();
    let mut minor = Vec::new();
    let mut in_minor = false;

    for raw in body.split(SEPARATOR) {
        if raw == MINOR_MARKER {
            if in_minor {
                return Err(invalid("minor marker appears twice"));
            }
            in_minor = true;
            continue;
        }

        let segment = unescape(raw).ok_or_else(|| invalid("bad percent escape"))?;
        if in_minor {
            minor.push(segment);
        } else {
            major.push(segment);
        }
    }

    if in_minor && minor.is_empty() && !major.is_empty() {
        return Err(invalid("minor marker without minor segments"));
    }

    Ok(CompositeKey::new(major, minor))
}

fn push_escaped(out: &mut String, segment: &str) {
    if segment == MINOR_MARKER {
        out.push_str("%2D");
        return;
    }

    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            _ => out.push(ch),
        }
    }
}

fn unescape(raw: &str) -> Option<String> {
    if !raw.contains('%') {
        return Some(raw.to_string());
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

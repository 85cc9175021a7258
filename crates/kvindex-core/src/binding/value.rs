use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

const SIGN_BIT: u64 = 1 << 63;

///
/// FieldKind
///
/// Declared type of one schema field.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Int,
    Float,
    Bool,
}

impl FieldKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// FieldValue
///
/// One named-field value of a structured record.
/// `Null` is a valid field value but never participates in an index.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Kind of this value, or `None` for `Null`.
    #[must_use]
    pub const fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Text(_) => Some(FieldKind::Text),
            Self::Int(_) => Some(FieldKind::Int),
            Self::Float(_) => Some(FieldKind::Float),
            Self::Bool(_) => Some(FieldKind::Bool),
            Self::Null => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Order-preserving key segment for this value; `None` for `Null`.
    ///
    /// Numeric segments are fixed-width hex so string order matches numeric
    /// order.
    #[must_use]
    pub fn to_segment(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Int(v) => Some(format!("{:016x}", v.cast_unsigned() ^ SIGN_BIT)),
            Self::Float(v) => Some(format!("{:016x}", ordered_f64_bits(*v))),
            Self::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            Self::Null => None,
        }
    }

    /// Parse a textual literal as a value of `kind`.
    pub fn parse(kind: FieldKind, literal: &str) -> Option<Self> {
        match kind {
            FieldKind::Text => Some(Self::Text(literal.to_string())),
            FieldKind::Int => literal.parse().ok().map(Self::Int),
            FieldKind::Float => literal
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::Float),
            FieldKind::Bool => literal.parse().ok().map(Self::Bool),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

// Negative floats flip all bits; positives flip only the sign bit.
// `-0.0` folds into `0.0` so equal values share one segment.
const fn ordered_f64_bits(v: f64) -> u64 {
    let bits = match v.to_bits() {
        SIGN_BIT => 0,
        bits => bits,
    };
    if bits & SIGN_BIT == 0 {
        bits ^ SIGN_BIT
    } else {
        !bits
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(v: FieldValue) -> String {
        v.to_segment().expect("indexable")
    }

    #[test]
    fn int_segments_sort_numerically() {
        let mut values = vec![42, -7, 0, i64::MIN, i64::MAX, -1, 1];
        let mut segments: Vec<String> = values.iter().map(|v| seg(FieldValue::Int(*v))).collect();
        values.sort_unstable();
        segments.sort();
        let expected: Vec<String> = values.iter().map(|v| seg(FieldValue::Int(*v))).collect();
        assert_eq!(segments, expected);
    }

    #[test]
    fn float_segments_sort_numerically() {
        let ordered = [-1.0e9, -2.5, -0.1, 0.0, 0.5, 3.0, 1.0e12];
        for pair in ordered.windows(2) {
            assert!(
                seg(FieldValue::Float(pair[0])) < seg(FieldValue::Float(pair[1])),
                "{} should sort before {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn signed_zeros_share_a_segment() {
        assert_eq!(seg(FieldValue::Float(-0.0)), seg(FieldValue::Float(0.0)));
        assert!(seg(FieldValue::Float(-f64::MIN_POSITIVE)) < seg(FieldValue::Float(-0.0)));
    }

    #[test]
    fn null_has_no_segment() {
        assert_eq!(FieldValue::Null.to_segment(), None);
    }

    #[test]
    fn parse_respects_kind() {
        assert_eq!(
            FieldValue::parse(FieldKind::Int, "-12"),
            Some(FieldValue::Int(-12))
        );
        assert_eq!(FieldValue::parse(FieldKind::Int, "twelve"), None);
        assert_eq!(
            FieldValue::parse(FieldKind::Bool, "true"),
            Some(FieldValue::Bool(true))
        );
        assert_eq!(FieldValue::parse(FieldKind::Float, "inf"), None);
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key/value set used for baseline, pending and effective preference state.
pub type PrefMap = BTreeMap<String, PrefValue>;

/// A single preference value as the daemon reports it.
///
/// Serialized untagged so a bundle file holds plain JSON values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<PrefValue>),
    Object(BTreeMap<String, PrefValue>),
}

impl PartialEq for PrefValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            // -0.0 == 0.0; NaN equals itself so `Eq` stays reflexive
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            // 8080 and 8080.0 are the same number on the wire
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => whole_float(*b) == Some(*a),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PrefValue {}

/// Exact `i64` value of a float, if it has one.
fn whole_float(f: f64) -> Option<i64> {
    // i64::MIN is exactly representable; i64::MAX rounds up to 2^63, which is out of range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() != 0.0 || !(-LIMIT..LIMIT).contains(&f) {
        return None;
    }
    Some(f as i64)
}

impl PrefValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PrefValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrefValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view. Whole floats count, fractional ones do not.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrefValue::Int(n) => Some(*n),
            PrefValue::Float(f) => whole_float(*f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PrefValue::Int(n) => Some(*n as f64),
            PrefValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PrefValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PrefValue]> {
        match self {
            PrefValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the variant, for log fields and rule faults.
    pub fn kind(&self) -> &'static str {
        match self {
            PrefValue::Null => "null",
            PrefValue::Bool(_) => "bool",
            PrefValue::Int(_) => "int",
            PrefValue::Float(_) => "float",
            PrefValue::Text(_) => "text",
            PrefValue::List(_) => "list",
            PrefValue::Object(_) => "object",
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl From<bool> for PrefValue {
    fn from(b: bool) -> Self {
        PrefValue::Bool(b)
    }
}

impl From<i64> for PrefValue {
    fn from(n: i64) -> Self {
        PrefValue::Int(n)
    }
}

impl From<i32> for PrefValue {
    fn from(n: i32) -> Self {
        PrefValue::Int(n.into())
    }
}

impl From<f64> for PrefValue {
    fn from(f: f64) -> Self {
        PrefValue::Float(f)
    }
}

impl From<&str> for PrefValue {
    fn from(s: &str) -> Self {
        PrefValue::Text(s.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(s: String) -> Self {
        PrefValue::Text(s)
    }
}

impl From<Vec<&str>> for PrefValue {
    fn from(items: Vec<&str>) -> Self {
        PrefValue::List(items.into_iter().map(PrefValue::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_whole_float_are_equal() {
        assert_eq!(PrefValue::Int(8080), PrefValue::Float(8080.0));
        assert_eq!(PrefValue::Float(8080.0), PrefValue::Int(8080));
        assert_ne!(PrefValue::Int(1), PrefValue::Float(1.5));
    }

    #[test]
    fn negative_zero_is_zero() {
        assert_eq!(PrefValue::Float(-0.0), PrefValue::Float(0.0));
        assert_eq!(PrefValue::Float(-0.0), PrefValue::Int(0));

        let v: PrefValue = serde_json::from_str("-0").unwrap();
        assert_eq!(v, PrefValue::Int(0));
    }

    #[test]
    fn nan_equals_itself() {
        let nan = PrefValue::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_ne!(nan, PrefValue::Float(0.0));
        assert_ne!(nan, PrefValue::Int(0));
    }

    #[test]
    fn large_ints_compare_exactly() {
        // Both round to the same f64.
        let big = 9_007_199_254_740_993_i64;
        let float = PrefValue::Float(big as f64);
        assert_eq!(float, PrefValue::Int(big - 1));
        assert_ne!(float, PrefValue::Int(big));

        assert_ne!(PrefValue::Float(9.3e18), PrefValue::Int(i64::MAX));
        assert_eq!(PrefValue::Float(i64::MIN as f64), PrefValue::Int(i64::MIN));
        assert_eq!(PrefValue::Float(9.3e18).as_i64(), None);
        assert_eq!(PrefValue::Float(f64::INFINITY).as_i64(), None);
    }

    #[test]
    fn different_variants_never_equal() {
        assert_ne!(PrefValue::Bool(true), PrefValue::Int(1));
        assert_ne!(PrefValue::Text("1".into()), PrefValue::Int(1));
        assert_ne!(PrefValue::Null, PrefValue::Bool(false));
    }

    #[test]
    fn untagged_json_shapes() {
        let v: PrefValue = serde_json::from_str("8080").unwrap();
        assert!(matches!(v, PrefValue::Int(8080)));

        let v: PrefValue = serde_json::from_str("0.5").unwrap();
        assert!(matches!(v, PrefValue::Float(f) if f == 0.5));

        let v: PrefValue = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(v, PrefValue::from(vec!["a", "b"]));

        let v: PrefValue = serde_json::from_str(r#"{"/downloads":1}"#).unwrap();
        assert_eq!(v.kind(), "object");

        let v: PrefValue = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn display_is_json() {
        assert_eq!(PrefValue::Text("en".into()).to_string(), "\"en\"");
        assert_eq!(PrefValue::Bool(false).to_string(), "false");
        assert_eq!(PrefValue::Int(-1).to_string(), "-1");
    }

    #[test]
    fn msgpack_keeps_float_variant() {
        let bytes = PrefValue::Float(2.0).to_msgpack().unwrap();
        let back = PrefValue::from_msgpack(&bytes).unwrap();
        assert!(matches!(back, PrefValue::Float(_)));
    }

    #[test]
    fn as_i64_accepts_whole_floats_only() {
        assert_eq!(PrefValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(PrefValue::Float(3.5).as_i64(), None);
        assert_eq!(PrefValue::Text("3".into()).as_i64(), None);
    }
}

//! The LLSD value model.
//!
//! [`Value`] is the tree every codec decodes into and encodes from. It is
//! plain data: freely mutable, exclusively owning its children, comparable
//! with `==`. The coercion methods (`to_*`) implement LLSD's "schema-less
//! but typed" access rules — they are total and never fail, falling back to
//! a well-defined default when the kinds do not line up.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::scalar;

/// Insertion-ordered map used for LLSD maps. Key order is preserved on
/// encode; decoding a duplicate key keeps the last value.
pub type Map = IndexMap<String, Value>;

/// A single LLSD value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// The explicit absent value, distinct from a missing map key.
    #[default]
    Undef,
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
    Uuid(Uuid),
    /// An instant with microsecond granularity. Decoders only ever produce
    /// microsecond-truncated instants; finer precision supplied by a caller
    /// is truncated on encode.
    Date(DateTime<Utc>),
    Uri(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Map(Map),
}

impl Value {
    /// A date value, truncated to LLSD's microsecond granularity.
    pub fn date(dt: DateTime<Utc>) -> Value {
        Value::Date(scalar::truncate_to_micros(dt))
    }

    /// A URI value.
    pub fn uri(text: impl Into<String>) -> Value {
        Value::Uri(text.into())
    }

    /// Name of this value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undef => "undef",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::Uri(_) => "uri",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Map(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Map(_))
    }

    /// The boolean payload, if this is a Boolean.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if this is an Integer.
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The real payload, if this is a Real.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// The text payload, if this is a String.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The UUID payload, if this is a Uuid.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// The instant payload, if this is a Date.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The URI text, if this is a Uri.
    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Value::Uri(u) => Some(u),
            _ => None,
        }
    }

    /// The octets, if this is a Binary.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// The elements, if this is an Array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a Map.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Coerce to boolean: non-zero, non-empty, non-epoch things are true.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undef => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0 && !r.is_nan(),
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Uuid(u) => !u.is_nil(),
            Value::Date(d) => d.timestamp_micros() != 0,
            Value::Uri(u) => !u.is_empty(),
            Value::Binary(b) => !b.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Coerce to a 32-bit integer. Reals truncate toward zero and saturate;
    /// NaN becomes 0; strings parse as signed decimal with 0 on failure;
    /// dates give whole seconds since the epoch; binary reads its first
    /// four bytes big-endian.
    pub fn to_integer(&self) -> i32 {
        match self {
            Value::Undef => 0,
            Value::Boolean(b) => i32::from(*b),
            Value::Integer(i) => *i,
            // `as` is exactly truncate-toward-zero with saturation, NaN -> 0
            Value::Real(r) => *r as i32,
            Value::String(s) => s.trim().parse().unwrap_or(0),
            Value::Uuid(_) => 0,
            Value::Date(d) => d
                .timestamp()
                .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            Value::Uri(_) => 0,
            Value::Binary(b) => match b.get(..4) {
                Some(prefix) => i32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]),
                None => 0,
            },
            Value::Array(_) | Value::Map(_) => 0,
        }
    }

    /// Coerce to a real. Strings parse with 0.0 on failure; dates give
    /// fractional seconds since the epoch; binary reads its first eight
    /// bytes as a big-endian IEEE-754 double.
    pub fn to_real(&self) -> f64 {
        match self {
            Value::Undef => 0.0,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Integer(i) => f64::from(*i),
            Value::Real(r) => *r,
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            Value::Uuid(_) => 0.0,
            Value::Date(d) => scalar::date_to_epoch_seconds(d),
            Value::Uri(_) => 0.0,
            Value::Binary(b) => match b.get(..8) {
                Some(p) => f64::from_be_bytes([p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]]),
                None => 0.0,
            },
            Value::Array(_) | Value::Map(_) => 0.0,
        }
    }

    /// Coerce to a UUID: identity for Uuid, strict parse for String (zero
    /// UUID on failure), zero UUID otherwise.
    pub fn to_uuid(&self) -> Uuid {
        match self {
            Value::Uuid(u) => *u,
            Value::String(s) => scalar::uuid_from_str(s).unwrap_or_else(Uuid::nil),
            _ => Uuid::nil(),
        }
    }

    /// Coerce to an instant: identity for Date, ISO-8601 parse for String
    /// (epoch on failure), epoch otherwise.
    pub fn to_date(&self) -> DateTime<Utc> {
        match self {
            Value::Date(d) => *d,
            Value::String(s) => scalar::date_from_str(s).unwrap_or_else(scalar::epoch),
            _ => scalar::epoch(),
        }
    }

    /// Coerce to octets: identity for Binary, the UTF-8 bytes for String,
    /// empty otherwise.
    pub fn to_binary(&self) -> Vec<u8> {
        match self {
            Value::Binary(b) => b.clone(),
            Value::String(s) => s.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Coerce to URI text: identity for Uri, the text for String, empty
    /// otherwise.
    pub fn to_uri(&self) -> String {
        match self {
            Value::Uri(u) => u.clone(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        }
    }
}

/// The canonical textual rendering: `true`/`` for booleans, decimal for
/// numbers, hyphenated lower-case for UUIDs, ISO-8601 for dates, unpadded
/// base64 line for binary, empty for undef and containers.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undef => Ok(()),
            Value::Boolean(b) => f.write_str(if *b { "true" } else { "" }),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => f.write_str(&scalar::real_to_string(*r)),
            Value::String(s) => f.write_str(s),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Date(d) => f.write_str(&scalar::date_to_string(d)),
            Value::Uri(u) => f.write_str(u),
            Value::Binary(b) => f.write_str(&scalar::base64_encode(b)),
            Value::Array(_) | Value::Map(_) => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::date(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boolean_coercion() {
        assert!(!Value::Undef.to_boolean());
        assert!(Value::Integer(-3).to_boolean());
        assert!(!Value::Integer(0).to_boolean());
        assert!(!Value::Real(f64::NAN).to_boolean());
        assert!(Value::Real(0.5).to_boolean());
        assert!(!Value::from("0").to_boolean());
        assert!(!Value::from("").to_boolean());
        assert!(Value::from("false").to_boolean()); // only "" and "0" are false
        assert!(!Value::Uuid(Uuid::nil()).to_boolean());
        assert!(!Value::date(scalar::epoch()).to_boolean());
        assert!(!Value::Array(vec![]).to_boolean());
        assert!(Value::Array(vec![Value::Undef]).to_boolean());
    }

    #[test]
    fn integer_coercion() {
        assert_eq!(Value::Boolean(true).to_integer(), 1);
        assert_eq!(Value::Real(3.9).to_integer(), 3);
        assert_eq!(Value::Real(-3.9).to_integer(), -3);
        assert_eq!(Value::Real(1e300).to_integer(), i32::MAX);
        assert_eq!(Value::Real(-1e300).to_integer(), i32::MIN);
        assert_eq!(Value::Real(f64::NAN).to_integer(), 0);
        assert_eq!(Value::from("42").to_integer(), 42);
        assert_eq!(Value::from("-7").to_integer(), -7);
        assert_eq!(Value::from("4.2").to_integer(), 0);
        assert_eq!(Value::Binary(vec![0, 0, 1, 0]).to_integer(), 256);
        assert_eq!(Value::Binary(vec![1, 2]).to_integer(), 0);
        assert_eq!(Value::Map(Map::new()).to_integer(), 0);
    }

    #[test]
    fn real_coercion() {
        assert_eq!(Value::Integer(2).to_real(), 2.0);
        assert_eq!(Value::from("2.5").to_real(), 2.5);
        assert_eq!(Value::from("junk").to_real(), 0.0);
        let bits = 1.5f64.to_be_bytes().to_vec();
        assert_eq!(Value::Binary(bits).to_real(), 1.5);
        assert_eq!(Value::Binary(vec![1, 2, 3]).to_real(), 0.0);
    }

    #[test]
    fn string_coercion_is_canonical() {
        assert_eq!(Value::Undef.to_string(), "");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Boolean(false).to_string(), "");
        assert_eq!(Value::Integer(-5).to_string(), "-5");
        assert_eq!(Value::Real(0.5).to_string(), "0.5");
        assert_eq!(Value::Binary(b"hi".to_vec()).to_string(), "aGk=");
        assert_eq!(Value::Array(vec![Value::Integer(1)]).to_string(), "");
        let dt = scalar::date_from_str("2009-01-01T20:00:10.100000Z").unwrap();
        assert_eq!(Value::date(dt).to_string(), "2009-01-01T20:00:10.100000Z");
    }

    #[test]
    fn uuid_and_date_coercion_from_strings() {
        let u = Value::from("6bad258e-06f0-4a87-a659-493117c9c162").to_uuid();
        assert_eq!(u.to_string(), "6bad258e-06f0-4a87-a659-493117c9c162");
        assert_eq!(Value::from("not a uuid").to_uuid(), Uuid::nil());
        assert_eq!(Value::from("junk").to_date(), scalar::epoch());
        assert_eq!(Value::Integer(5).to_date(), scalar::epoch());
    }

    #[test]
    fn binary_and_uri_coercion() {
        assert_eq!(Value::from("hi").to_binary(), b"hi".to_vec());
        assert_eq!(Value::Integer(3).to_binary(), Vec::<u8>::new());
        assert_eq!(Value::uri("http://example.com/").to_uri(), "http://example.com/");
        assert_eq!(Value::from("x").to_uri(), "x");
        assert_eq!(Value::Undef.to_uri(), "");
    }

    #[test]
    fn date_constructor_truncates_to_micros() {
        let fine = DateTime::from_timestamp(1_230_840_010, 123_456_789).unwrap();
        let v = Value::date(fine);
        assert_eq!(v.as_date().unwrap().timestamp_subsec_micros(), 123_456);
        assert_eq!(v.as_date().unwrap().timestamp_subsec_nanos(), 123_456_000);
    }
}

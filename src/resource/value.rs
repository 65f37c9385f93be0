//! Simple attribute values and their wire encodings.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{ScimError, ScimResult};
use crate::schema::DataType;

/// A simple (non-complex) SCIM value.
///
/// The string form is the canonical over-the-wire encoding for every
/// non-binary type; binary values travel as base64.
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleValue {
    /// String value
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Instant with UTC semantics
    DateTime(DateTime<Utc>),
    /// Opaque byte sequence
    Binary(Vec<u8>),
}

impl SimpleValue {
    /// The data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            SimpleValue::String(_) => DataType::String,
            SimpleValue::Boolean(_) => DataType::Boolean,
            SimpleValue::Integer(_) => DataType::Integer,
            SimpleValue::DateTime(_) => DataType::DateTime,
            SimpleValue::Binary(_) => DataType::Binary,
        }
    }

    /// The canonical wire string for this value.
    ///
    /// Datetimes render as ISO-8601 UTC with millisecond precision; binary
    /// values as base64.
    pub fn to_wire_string(&self) -> String {
        match self {
            SimpleValue::String(s) => s.clone(),
            SimpleValue::Boolean(b) => b.to_string(),
            SimpleValue::Integer(i) => i.to_string(),
            SimpleValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            SimpleValue::Binary(bytes) => BASE64.encode(bytes),
        }
    }

    /// Parse a wire string into a value of the given type.
    ///
    /// Integers parse as decimal, booleans as `true`/`false` case-insensitive,
    /// datetimes as ISO-8601 UTC with optional sub-second precision, binary as
    /// base64. Malformed input raises `InvalidAttributeValue`.
    pub fn parse(data_type: DataType, raw: &str) -> ScimResult<Self> {
        match data_type {
            DataType::String => Ok(SimpleValue::String(raw.to_string())),
            DataType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(SimpleValue::Boolean(true)),
                "false" => Ok(SimpleValue::Boolean(false)),
                _ => Err(ScimError::invalid_value(format!(
                    "'{raw}' is not a boolean"
                ))),
            },
            DataType::Integer => raw
                .parse::<i64>()
                .map(SimpleValue::Integer)
                .map_err(|_| ScimError::invalid_value(format!("'{raw}' is not an integer"))),
            DataType::DateTime => DateTime::parse_from_rfc3339(raw)
                .map(|dt| SimpleValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| {
                    ScimError::invalid_value(format!("'{raw}' is not an ISO-8601 datetime"))
                }),
            DataType::Binary => BASE64
                .decode(raw)
                .map(SimpleValue::Binary)
                .map_err(|_| ScimError::invalid_value(format!("'{raw}' is not valid base64"))),
            DataType::Complex => Err(ScimError::invalid_value(
                "complex attributes have no simple value".to_string(),
            )),
        }
    }

    /// The contained string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SimpleValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The contained boolean, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SimpleValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The contained integer, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SimpleValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The contained instant, if this is a datetime value.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            SimpleValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl From<&str> for SimpleValue {
    fn from(value: &str) -> Self {
        SimpleValue::String(value.to_string())
    }
}

impl From<String> for SimpleValue {
    fn from(value: String) -> Self {
        SimpleValue::String(value)
    }
}

impl From<bool> for SimpleValue {
    fn from(value: bool) -> Self {
        SimpleValue::Boolean(value)
    }
}

impl From<i64> for SimpleValue {
    fn from(value: i64) -> Self {
        SimpleValue::Integer(value)
    }
}

//! Value transformations between LDAP octet strings and SCIM values.
//!
//! Every mapped attribute is associated with a named transformation from a
//! closed registry. Configuration references transformations by short name;
//! unknown names fail configuration load rather than being resolved
//! dynamically.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::error::{ScimError, ScimResult};
use crate::resource::SimpleValue;
use crate::schema::{AttributeDescriptor, DataType};

/// A bidirectional conversion between SCIM values and LDAP octet strings.
///
/// Implementations must be total over well-formed inputs and raise
/// `InvalidAttributeValue` on ill-formed data.
pub trait Transformation: Send + Sync {
    /// Encode a SCIM value as an LDAP attribute value.
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>>;

    /// Decode an LDAP attribute value into a SCIM value of the descriptor's
    /// type.
    fn to_scim_value(
        &self,
        descriptor: &AttributeDescriptor,
        raw: &[u8],
    ) -> ScimResult<SimpleValue>;

    /// Convert a raw SCIM filter literal into the LDAP assertion value
    /// string (before filter escaping).
    fn to_ldap_filter_value(&self, literal: &str) -> ScimResult<String>;
}

fn utf8<'a>(descriptor: &AttributeDescriptor, raw: &'a [u8]) -> ScimResult<&'a str> {
    std::str::from_utf8(raw).map_err(|_| {
        ScimError::invalid_value(format!(
            "attribute '{}' holds a non-UTF-8 value",
            descriptor.name
        ))
    })
}

/// Identity transformation: the SCIM wire string is the LDAP value.
///
/// Binary attributes travel as raw octets rather than base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransformation;

impl Transformation for DefaultTransformation {
    fn to_ldap_value(
        &self,
        _descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        Ok(match value {
            SimpleValue::Binary(bytes) => bytes.clone(),
            other => other.to_wire_string().into_bytes(),
        })
    }

    fn to_scim_value(
        &self,
        descriptor: &AttributeDescriptor,
        raw: &[u8],
    ) -> ScimResult<SimpleValue> {
        if descriptor.data_type == DataType::Binary {
            return Ok(SimpleValue::Binary(raw.to_vec()));
        }
        SimpleValue::parse(descriptor.data_type, utf8(descriptor, raw)?)
    }

    fn to_ldap_filter_value(&self, literal: &str) -> ScimResult<String> {
        Ok(literal.to_string())
    }
}

/// Render an instant in LDAP generalized-time form, `YYYYMMDDhhmmss.sssZ`.
pub fn format_generalized_time(instant: DateTime<Utc>) -> String {
    format!("{}Z", instant.format("%Y%m%d%H%M%S%.3f"))
}

/// Parse LDAP generalized time with optional fractional seconds.
pub fn parse_generalized_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.strip_suffix('Z')?;
    let (base, fraction) = match raw.split_once('.') {
        Some((base, fraction)) => (base, Some(fraction)),
        None => (raw, None),
    };
    let mut naive = NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S").ok()?;
    if let Some(fraction) = fraction {
        if fraction.is_empty()
            || fraction.len() > 9
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let nanos: i64 = format!("{fraction:0<9}").parse().ok()?;
        naive = naive.checked_add_signed(Duration::nanoseconds(nanos))?;
    }
    Some(Utc.from_utc_datetime(&naive))
}

/// Round-trips ISO-8601 UTC datetimes to LDAP generalized-time syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizedTimeTransformation;

impl Transformation for GeneralizedTimeTransformation {
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        match value {
            SimpleValue::DateTime(instant) => {
                Ok(format_generalized_time(*instant).into_bytes())
            }
            other => Err(ScimError::invalid_value(format!(
                "attribute '{}' expects a datetime, got {}",
                descriptor.name,
                other.data_type().as_str()
            ))),
        }
    }

    fn to_scim_value(
        &self,
        descriptor: &AttributeDescriptor,
        raw: &[u8],
    ) -> ScimResult<SimpleValue> {
        let text = utf8(descriptor, raw)?;
        parse_generalized_time(text)
            .map(SimpleValue::DateTime)
            .ok_or_else(|| {
                ScimError::invalid_value(format!("'{text}' is not LDAP generalized time"))
            })
    }

    fn to_ldap_filter_value(&self, literal: &str) -> ScimResult<String> {
        match SimpleValue::parse(DataType::DateTime, literal)? {
            SimpleValue::DateTime(instant) => Ok(format_generalized_time(instant)),
            _ => unreachable!("datetime parse yields datetime"),
        }
    }
}

/// Maps between SCIM multi-line postal addresses and the `$`-separated LDAP
/// `postalAddress` syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostalAddressTransformation;

impl Transformation for PostalAddressTransformation {
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        match value {
            SimpleValue::String(text) => Ok(text.replace('\n', "$").into_bytes()),
            other => Err(ScimError::invalid_value(format!(
                "attribute '{}' expects a string, got {}",
                descriptor.name,
                other.data_type().as_str()
            ))),
        }
    }

    fn to_scim_value(
        &self,
        descriptor: &AttributeDescriptor,
        raw: &[u8],
    ) -> ScimResult<SimpleValue> {
        Ok(SimpleValue::String(utf8(descriptor, raw)?.replace('$', "\n")))
    }

    fn to_ldap_filter_value(&self, literal: &str) -> ScimResult<String> {
        Ok(literal.replace('\n', "$"))
    }
}

/// Normalizes telephone numbers: an RFC 3966 `tel:` prefix is stripped on
/// the way into the directory; printable strings pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelephoneNumberTransformation;

fn strip_tel_prefix(text: &str) -> &str {
    text.strip_prefix("tel:").unwrap_or(text)
}

impl Transformation for TelephoneNumberTransformation {
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        match value {
            SimpleValue::String(text) => Ok(strip_tel_prefix(text).as_bytes().to_vec()),
            other => Err(ScimError::invalid_value(format!(
                "attribute '{}' expects a string, got {}",
                descriptor.name,
                other.data_type().as_str()
            ))),
        }
    }

    fn to_scim_value(
        &self,
        descriptor: &AttributeDescriptor,
        raw: &[u8],
    ) -> ScimResult<SimpleValue> {
        Ok(SimpleValue::String(utf8(descriptor, raw)?.to_string()))
    }

    fn to_ldap_filter_value(&self, literal: &str) -> ScimResult<String> {
        Ok(strip_tel_prefix(literal).to_string())
    }
}

/// The closed, name-keyed transformation catalog.
///
/// Custom transformations register at startup; configuration referencing an
/// unregistered name fails to load.
pub struct TransformationRegistry {
    entries: HashMap<String, Arc<dyn Transformation>>,
}

impl TransformationRegistry {
    /// A registry holding the built-in transformations.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry.register("default", Arc::new(DefaultTransformation));
        registry.register("generalizedTime", Arc::new(GeneralizedTimeTransformation));
        registry.register("postalAddress", Arc::new(PostalAddressTransformation));
        registry.register("telephoneNumber", Arc::new(TelephoneNumberTransformation));
        registry
    }

    /// Register a transformation under a short name, replacing any previous
    /// entry. Names compare case-insensitively.
    pub fn register(&mut self, name: &str, transformation: Arc<dyn Transformation>) {
        self.entries.insert(name.to_lowercase(), transformation);
    }

    /// Look up a transformation by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformation>> {
        self.entries.get(&name.to_lowercase()).cloned()
    }
}

impl Default for TransformationRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

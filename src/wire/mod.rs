//! Wire codecs for SCIM resources, query results, and errors.
//!
//! Two paired codecs share the [`ScimObject`](crate::resource::ScimObject)
//! model: [`json`] and [`xml`]. Both locate attributes against the resource
//! descriptor, silently ignore unknown attributes, and type simple values
//! from the descriptor at parse time. Serialization is deterministic; plural
//! element sub-attributes follow the fixed order `value, type, primary,
//! display, operation`.

pub mod json;
pub mod xml;

/// The two wire forms, selected by content negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `application/json`
    Json,
    /// `application/xml` or `text/xml`
    Xml,
}

impl WireFormat {
    /// Pick a wire form from a media type, defaulting to JSON for unknown
    /// or absent types.
    pub fn from_media_type(media_type: Option<&str>) -> Self {
        let Some(media_type) = media_type else {
            return Self::Json;
        };
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or(media_type)
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/xml" | "text/xml" => Self::Xml,
            _ => Self::Json,
        }
    }

    /// The canonical media type of this wire form.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }
}

/// Serialization order for the well-known plural element sub-attributes.
pub(crate) const PLURAL_SUB_ORDER: [&str; 5] =
    ["value", "type", "primary", "display", "operation"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_types_negotiate_the_wire_form() {
        assert_eq!(WireFormat::from_media_type(None), WireFormat::Json);
        assert_eq!(
            WireFormat::from_media_type(Some("application/json; charset=utf-8")),
            WireFormat::Json
        );
        assert_eq!(
            WireFormat::from_media_type(Some("Application/XML")),
            WireFormat::Xml
        );
        assert_eq!(WireFormat::from_media_type(Some("text/xml")), WireFormat::Xml);
    }
}

//! Core descriptor types for SCIM attributes.

use std::sync::Arc;

/// SCIM attribute data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// String value
    String,
    /// Boolean value
    Boolean,
    /// Integer number
    Integer,
    /// Instant with UTC semantics
    DateTime,
    /// Opaque byte sequence (base64 on the wire)
    Binary,
    /// Complex attribute with sub-attributes
    Complex,
}

impl DataType {
    /// Whether values of this type are simple (everything but `Complex`).
    pub fn is_simple(&self) -> bool {
        !matches!(self, DataType::Complex)
    }

    /// The wire name of this type, as it appears in configuration documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::DateTime => "dateTime",
            DataType::Binary => "binary",
            DataType::Complex => "complex",
        }
    }
}

/// Immutable metadata for a single SCIM attribute.
///
/// Descriptors are created by the configuration loader and shared behind
/// [`Arc`] for the lifetime of the process. Sub-attributes are always
/// singular and simple; only complex or complex-plural descriptors carry
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    /// Schema URN this attribute belongs to
    pub schema: String,
    /// Attribute name
    pub name: String,
    /// Data type of the attribute's values
    pub data_type: DataType,
    /// Whether the attribute is plural
    pub multi_valued: bool,
    /// Whether the attribute is managed by the server
    pub read_only: bool,
    /// Whether the attribute must be present on create/replace
    pub required: bool,
    /// Whether string comparison is case-sensitive
    pub case_exact: bool,
    /// Human-readable description
    pub description: String,
    /// Ordered sub-attribute descriptors (complex shapes only)
    pub sub_attributes: Vec<Arc<AttributeDescriptor>>,
    /// Recognized `type` tags for plural attributes
    pub canonical_types: Vec<String>,
}

impl AttributeDescriptor {
    /// Create a singular simple descriptor with permissive defaults.
    pub fn simple(schema: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            data_type,
            multi_valued: false,
            read_only: false,
            required: false,
            case_exact: false,
            description: String::new(),
            sub_attributes: Vec::new(),
            canonical_types: Vec::new(),
        }
    }

    /// Create a singular complex descriptor from its sub-attributes.
    pub fn complex(
        schema: impl Into<String>,
        name: impl Into<String>,
        sub_attributes: Vec<Arc<AttributeDescriptor>>,
    ) -> Self {
        Self {
            data_type: DataType::Complex,
            sub_attributes,
            ..Self::simple(schema, name, DataType::Complex)
        }
    }

    /// Mark this descriptor as plural, optionally with canonical type tags.
    pub fn plural(mut self, canonical_types: Vec<String>) -> Self {
        self.multi_valued = true;
        self.canonical_types = canonical_types;
        self
    }

    /// Mark this descriptor read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Mark this descriptor required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set case-exact matching.
    pub fn case_exact(mut self, case_exact: bool) -> Self {
        self.case_exact = case_exact;
        self
    }

    /// Look up a sub-attribute by name, case-insensitively.
    pub fn sub_attribute(&self, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.sub_attributes
            .iter()
            .find(|sub| sub.name.eq_ignore_ascii_case(name))
    }

    /// Whether this attribute is a plural with complex elements.
    pub fn is_complex_plural(&self) -> bool {
        self.multi_valued && !self.sub_attributes.is_empty()
    }

    /// The case-folded `(schema, name)` key this attribute is stored under.
    pub fn key(&self) -> (String, String) {
        (self.schema.to_lowercase(), self.name.to_lowercase())
    }

    /// Check the structural invariants of this descriptor.
    ///
    /// Sub-attributes exist iff the shape is complex (or complex plural),
    /// sub-attribute names are unique case-insensitively, and sub-attributes
    /// are themselves singular and simple.
    pub fn validate(&self) -> Result<(), String> {
        let complex_shape = self.data_type == DataType::Complex;
        if complex_shape && self.sub_attributes.is_empty() {
            return Err("complex attribute declares no sub-attributes".into());
        }
        if !complex_shape && !self.sub_attributes.is_empty() {
            return Err("simple attribute declares sub-attributes".into());
        }
        let mut seen = Vec::new();
        for sub in &self.sub_attributes {
            let lower = sub.name.to_lowercase();
            if seen.contains(&lower) {
                return Err(format!("duplicate sub-attribute '{}'", sub.name));
            }
            seen.push(lower);
            if sub.multi_valued {
                return Err(format!("sub-attribute '{}' must be singular", sub.name));
            }
            if sub.data_type == DataType::Complex {
                return Err(format!("sub-attribute '{}' must be simple", sub.name));
            }
        }
        Ok(())
    }
}

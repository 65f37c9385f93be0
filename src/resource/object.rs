//! The schema-keyed attribute container and query parameter types.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ScimError, ScimResult};
use crate::filter::AttributePath;
use crate::schema::{AttributeDescriptor, ResourceDescriptor};

use super::value::SimpleValue;

/// The value side of a complex attribute or of one plural element: a
/// case-insensitive map from sub-attribute name to attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexValue {
    subs: BTreeMap<String, ScimAttribute>,
}

impl ComplexValue {
    /// Create an empty complex value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sub-attribute, replacing any existing one with the same name.
    pub fn insert(&mut self, attribute: ScimAttribute) {
        self.subs
            .insert(attribute.descriptor().name.to_lowercase(), attribute);
    }

    /// Look up a sub-attribute by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&ScimAttribute> {
        self.subs.get(&name.to_lowercase())
    }

    /// The simple value of a named sub-attribute, if present.
    pub fn simple_value(&self, name: &str) -> Option<&SimpleValue> {
        self.get(name).and_then(|attr| attr.simple_value())
    }

    /// Iterate over sub-attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ScimAttribute> {
        self.subs.values()
    }

    /// Whether no sub-attribute is present.
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Number of present sub-attributes.
    pub fn len(&self) -> usize {
        self.subs.len()
    }
}

impl FromIterator<ScimAttribute> for ComplexValue {
    fn from_iter<I: IntoIterator<Item = ScimAttribute>>(iter: I) -> Self {
        let mut value = Self::new();
        for attr in iter {
            value.insert(attr);
        }
        value
    }
}

/// One value of a SCIM attribute: either simple or a sub-attribute map.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// A simple value
    Simple(SimpleValue),
    /// A complex value or one element of a plural attribute
    Complex(ComplexValue),
}

impl AttributeValue {
    /// The contained simple value, if any.
    pub fn as_simple(&self) -> Option<&SimpleValue> {
        match self {
            AttributeValue::Simple(v) => Some(v),
            AttributeValue::Complex(_) => None,
        }
    }

    /// The contained complex value, if any.
    pub fn as_complex(&self) -> Option<&ComplexValue> {
        match self {
            AttributeValue::Simple(_) => None,
            AttributeValue::Complex(c) => Some(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AttributeContent {
    Singular(AttributeValue),
    Plural(Vec<AttributeValue>),
}

/// A descriptor paired with its value(s).
///
/// Plural value order is preserved but carries no meaning;
/// [`ScimAttribute::equals_ignoring_order`] compares plurals as multisets.
#[derive(Debug, Clone, PartialEq)]
pub struct ScimAttribute {
    descriptor: Arc<AttributeDescriptor>,
    content: AttributeContent,
}

impl ScimAttribute {
    /// Create a singular attribute.
    pub fn singular(descriptor: Arc<AttributeDescriptor>, value: AttributeValue) -> Self {
        Self {
            descriptor,
            content: AttributeContent::Singular(value),
        }
    }

    /// Create a singular attribute from a simple value.
    pub fn simple(descriptor: Arc<AttributeDescriptor>, value: SimpleValue) -> Self {
        Self::singular(descriptor, AttributeValue::Simple(value))
    }

    /// Create a plural attribute from its ordered elements.
    pub fn plural(descriptor: Arc<AttributeDescriptor>, values: Vec<AttributeValue>) -> Self {
        Self {
            descriptor,
            content: AttributeContent::Plural(values),
        }
    }

    /// The descriptor this attribute was built from.
    pub fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    /// Whether this attribute holds a sequence of values.
    pub fn is_plural(&self) -> bool {
        matches!(self.content, AttributeContent::Plural(_))
    }

    /// All values, a singular attribute yielding a one-element slice.
    pub fn values(&self) -> &[AttributeValue] {
        match &self.content {
            AttributeContent::Singular(value) => std::slice::from_ref(value),
            AttributeContent::Plural(values) => values.as_slice(),
        }
    }

    /// The single value of a singular attribute.
    pub fn singular_value(&self) -> Option<&AttributeValue> {
        match &self.content {
            AttributeContent::Singular(value) => Some(value),
            AttributeContent::Plural(_) => None,
        }
    }

    /// The simple value of a singular simple attribute.
    pub fn simple_value(&self) -> Option<&SimpleValue> {
        self.singular_value().and_then(AttributeValue::as_simple)
    }

    /// The complex value of a singular complex attribute.
    pub fn complex_value(&self) -> Option<&ComplexValue> {
        self.singular_value().and_then(AttributeValue::as_complex)
    }

    /// Compare two attributes treating plural values as multisets.
    pub fn equals_ignoring_order(&self, other: &Self) -> bool {
        if self.descriptor.key() != other.descriptor.key() {
            return false;
        }
        match (&self.content, &other.content) {
            (AttributeContent::Singular(a), AttributeContent::Singular(b)) => a == b,
            (AttributeContent::Plural(a), AttributeContent::Plural(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                let mut used = vec![false; b.len()];
                a.iter().all(|value| {
                    b.iter().enumerate().any(|(i, candidate)| {
                        if !used[i] && value == candidate {
                            used[i] = true;
                            true
                        } else {
                            false
                        }
                    })
                })
            }
            _ => false,
        }
    }
}

/// A SCIM resource in memory: attributes keyed case-insensitively by
/// `(schema URN, attribute name)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScimObject {
    attributes: BTreeMap<(String, String), ScimAttribute>,
}

impl ScimObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute, replacing any existing one under the same key.
    pub fn add(&mut self, attribute: ScimAttribute) {
        self.attributes
            .insert(attribute.descriptor().key(), attribute);
    }

    /// Look up an attribute by `(schema URN, name)`, case-insensitively.
    pub fn get(&self, schema: &str, name: &str) -> Option<&ScimAttribute> {
        self.attributes
            .get(&(schema.to_lowercase(), name.to_lowercase()))
    }

    /// Remove and return the attribute under the given key.
    pub fn remove(&mut self, schema: &str, name: &str) -> Option<ScimAttribute> {
        self.attributes
            .remove(&(schema.to_lowercase(), name.to_lowercase()))
    }

    /// Iterate over all attributes in key order.
    pub fn attributes(&self) -> impl Iterator<Item = &ScimAttribute> {
        self.attributes.values()
    }

    /// Iterate over the attributes of one schema URN.
    pub fn attributes_for_schema<'a>(
        &'a self,
        schema: &'a str,
    ) -> impl Iterator<Item = &'a ScimAttribute> {
        let schema = schema.to_lowercase();
        self.attributes
            .iter()
            .filter(move |((s, _), _)| *s == schema)
            .map(|(_, attr)| attr)
    }

    /// Every schema URN present on this object, in key order.
    pub fn schemas(&self) -> Vec<String> {
        let mut urns: Vec<String> = Vec::new();
        for attr in self.attributes.values() {
            let urn = &attr.descriptor().schema;
            if !urns.iter().any(|u| u.eq_ignore_ascii_case(urn)) {
                urns.push(urn.clone());
            }
        }
        urns
    }

    /// Number of attributes present.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the object holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Compare two objects treating plural values as multisets.
    pub fn equals_ignoring_order(&self, other: &Self) -> bool {
        self.attributes.len() == other.attributes.len()
            && self.attributes.iter().all(|(key, attr)| {
                other
                    .attributes
                    .get(key)
                    .is_some_and(|b| attr.equals_ignoring_order(b))
            })
    }
}

/// The set of attributes a request asks for.
///
/// An empty selection means "all". A selected `(schema, name)` pair with no
/// sub-attribute requests the whole attribute including every sub-attribute.
#[derive(Debug, Clone, Default)]
pub struct QueryAttributes {
    selected: Vec<(String, String, Option<String>)>,
}

impl QueryAttributes {
    /// Request all attributes.
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether every attribute is requested.
    pub fn is_all(&self) -> bool {
        self.selected.is_empty()
    }

    /// Parse a comma-separated `attributes` request parameter against a
    /// resource, resolving schema-less paths to the resource's core schema.
    pub fn parse(resource: &ResourceDescriptor, requested: &str) -> ScimResult<Self> {
        let mut selected = Vec::new();
        for part in requested.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let path = AttributePath::parse(part)
                .map_err(|e| ScimError::invalid_resource(format!("bad attribute path: {e}")))?;
            let schema = path
                .schema
                .unwrap_or_else(|| resource.schema.clone())
                .to_lowercase();
            selected.push((schema, path.name.to_lowercase(), path.sub.map(|s| s.to_lowercase())));
        }
        Ok(Self { selected })
    }

    /// Build a selection from already-resolved paths.
    pub fn from_paths(resource: &ResourceDescriptor, paths: &[AttributePath]) -> Self {
        let selected = paths
            .iter()
            .map(|path| {
                let schema = path
                    .schema
                    .clone()
                    .unwrap_or_else(|| resource.schema.clone())
                    .to_lowercase();
                (
                    schema,
                    path.name.to_lowercase(),
                    path.sub.clone().map(|s| s.to_lowercase()),
                )
            })
            .collect();
        Self { selected }
    }

    /// Whether the attribute is requested at all (any sub-attribute counts).
    pub fn is_requested(&self, schema: &str, name: &str) -> bool {
        if self.selected.is_empty() {
            return true;
        }
        let schema = schema.to_lowercase();
        let name = name.to_lowercase();
        self.selected
            .iter()
            .any(|(s, n, _)| *s == schema && *n == name)
    }

    /// Whether a specific sub-attribute is requested.
    pub fn is_sub_requested(&self, schema: &str, name: &str, sub: &str) -> bool {
        if self.selected.is_empty() {
            return true;
        }
        let schema = schema.to_lowercase();
        let name = name.to_lowercase();
        let sub = sub.to_lowercase();
        self.selected.iter().any(|(s, n, selected_sub)| {
            *s == schema
                && *n == name
                && selected_sub.as_ref().is_none_or(|selected| *selected == sub)
        })
    }
}

/// Sort direction and path for a query.
#[derive(Debug, Clone)]
pub struct SortParameters {
    /// The attribute path to sort on
    pub path: AttributePath,
    /// Ascending (`true`) or descending order
    pub ascending: bool,
}

/// Pagination window for a query.
#[derive(Debug, Clone, Copy)]
pub struct PageParameters {
    /// 1-based index of the first result to return
    pub start_index: usize,
    /// Maximum number of results to return
    pub count: usize,
}

impl PageParameters {
    /// Create a window, clamping `start_index` to at least 1.
    pub fn new(start_index: usize, count: usize) -> Self {
        Self {
            start_index: start_index.max(1),
            count,
        }
    }
}

/// A query result with its list envelope fields.
#[derive(Debug, Clone, Default)]
pub struct ListResponse {
    /// The page of resources, in result order
    pub resources: Vec<ScimObject>,
    /// Total number of matching resources before paging
    pub total_results: usize,
    /// 1-based index of the first returned resource
    pub start_index: usize,
}

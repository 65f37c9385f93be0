//! Registry of resource descriptors, indexed by endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::AttributeDescriptor;

/// The schema-level description of one SCIM resource type.
///
/// Pairs the resource's core schema URN with every top-level attribute
/// descriptor the resource recognizes, across the core schema and any
/// extension schemas.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Resource name, used as the XML root element local name (e.g. `User`)
    pub name: String,
    /// Endpoint path segment (e.g. `Users`)
    pub endpoint: String,
    /// Core schema URN for this resource
    pub schema: String,
    /// Top-level attribute descriptors, in declaration order
    pub attributes: Vec<Arc<AttributeDescriptor>>,
}

impl ResourceDescriptor {
    /// Look up a top-level attribute by `(schema URN, name)`, both
    /// case-insensitive.
    pub fn attribute(&self, schema: &str, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.attributes.iter().find(|attr| {
            attr.schema.eq_ignore_ascii_case(schema) && attr.name.eq_ignore_ascii_case(name)
        })
    }

    /// Look up a top-level attribute of the core schema by name.
    pub fn core_attribute(&self, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.attribute(&self.schema, name)
    }

    /// Look up a sub-attribute of a named parent, case-insensitively.
    pub fn sub_attribute(
        &self,
        schema: &str,
        parent: &str,
        name: &str,
    ) -> Option<&Arc<AttributeDescriptor>> {
        self.attribute(schema, parent)
            .and_then(|attr| attr.sub_attribute(name))
    }

    /// Every schema URN referenced by this resource's attributes, the core
    /// schema first.
    pub fn schema_urns(&self) -> Vec<String> {
        let mut urns = vec![self.schema.clone()];
        for attr in &self.attributes {
            if !urns.iter().any(|u| u.eq_ignore_ascii_case(&attr.schema)) {
                urns.push(attr.schema.clone());
            }
        }
        urns
    }
}

/// Catalog of every configured resource type.
///
/// Built once by the configuration loader and shared read-only across all
/// request handlers.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    resources: HashMap<String, Arc<ResourceDescriptor>>,
}

impl SchemaRegistry {
    /// Build a registry from resource descriptors.
    pub fn new(resources: Vec<ResourceDescriptor>) -> Self {
        let resources = resources
            .into_iter()
            .map(|r| (r.endpoint.to_lowercase(), Arc::new(r)))
            .collect();
        Self { resources }
    }

    /// Look up a resource by endpoint name, case-insensitively.
    pub fn resource(&self, endpoint: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.resources.get(&endpoint.to_lowercase())
    }

    /// Iterate over all registered resources.
    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.resources.values()
    }
}

//! Mapper for singular complex attributes.

use std::sync::Arc;

use crate::error::ScimResult;
use crate::filter::FilterOp;
use crate::ldap::Entry;
use crate::resource::{AttributeValue, ComplexValue, ScimAttribute, ScimObject};
use crate::schema::AttributeDescriptor;
use crate::transform::Transformation;

use super::{AttributeMapper, simple_filter_fragment};

/// One sub-attribute binding inside a complex mapping.
pub struct SubAttributeBinding {
    /// Descriptor of the sub-attribute
    pub descriptor: Arc<AttributeDescriptor>,
    /// LDAP attribute type backing this sub-attribute
    pub ldap_attribute: String,
    /// Value transformation for this binding
    pub transform: Arc<dyn Transformation>,
}

/// Binds each sub-attribute of a complex SCIM attribute to its own LDAP
/// attribute type.
///
/// A sub-attribute absent in LDAP is absent in SCIM; the complex attribute
/// as a whole is present as soon as one sub-attribute is.
pub struct ComplexMapper {
    descriptor: Arc<AttributeDescriptor>,
    bindings: Vec<SubAttributeBinding>,
}

impl ComplexMapper {
    /// Create a mapper from its sub-attribute bindings.
    pub fn new(descriptor: Arc<AttributeDescriptor>, bindings: Vec<SubAttributeBinding>) -> Self {
        Self {
            descriptor,
            bindings,
        }
    }

    fn binding(&self, sub: &str) -> Option<&SubAttributeBinding> {
        self.bindings
            .iter()
            .find(|b| b.descriptor.name.eq_ignore_ascii_case(sub))
    }
}

impl AttributeMapper for ComplexMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        self.bindings
            .iter()
            .map(|b| b.ldap_attribute.clone())
            .collect()
    }

    fn to_ldap(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()> {
        let attribute = object.get(&self.descriptor.schema, &self.descriptor.name);
        let Some(complex) = attribute.and_then(ScimAttribute::complex_value) else {
            return Ok(());
        };
        for binding in &self.bindings {
            if let Some(value) = complex.simple_value(&binding.descriptor.name) {
                let raw = binding.transform.to_ldap_value(&binding.descriptor, value)?;
                entry.add_value(&binding.ldap_attribute, raw);
            }
        }
        Ok(())
    }

    fn to_scim(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>> {
        let mut complex = ComplexValue::new();
        for binding in &self.bindings {
            if let Some(raw) = entry.first_value(&binding.ldap_attribute) {
                let value = binding.transform.to_scim_value(&binding.descriptor, raw)?;
                complex.insert(ScimAttribute::simple(binding.descriptor.clone(), value));
            }
        }
        if complex.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::singular(
            self.descriptor.clone(),
            AttributeValue::Complex(complex),
        )))
    }

    fn to_ldap_filter(
        &self,
        op: FilterOp,
        sub: Option<&str>,
        value: Option<&str>,
    ) -> ScimResult<Option<String>> {
        let Some(binding) = sub.and_then(|s| self.binding(s)) else {
            return Ok(None);
        };
        simple_filter_fragment(&binding.ldap_attribute, binding.transform.as_ref(), op, value)
            .map(Some)
    }

    fn ldap_sort_attribute(&self, sub: Option<&str>) -> Option<String> {
        sub.and_then(|s| self.binding(s))
            .map(|b| b.ldap_attribute.clone())
    }
}

//! Mapper for singular simple attributes.

use std::sync::Arc;

use crate::error::ScimResult;
use crate::filter::FilterOp;
use crate::ldap::Entry;
use crate::resource::{ScimAttribute, ScimObject};
use crate::schema::AttributeDescriptor;
use crate::transform::Transformation;

use super::{AttributeMapper, simple_filter_fragment};

/// Binds one simple SCIM attribute to one LDAP attribute type.
pub struct SimpleMapper {
    descriptor: Arc<AttributeDescriptor>,
    ldap_attribute: String,
    transform: Arc<dyn Transformation>,
}

impl SimpleMapper {
    /// Create a mapper for `descriptor` backed by `ldap_attribute`.
    pub fn new(
        descriptor: Arc<AttributeDescriptor>,
        ldap_attribute: impl Into<String>,
        transform: Arc<dyn Transformation>,
    ) -> Self {
        Self {
            descriptor,
            ldap_attribute: ldap_attribute.into(),
            transform,
        }
    }

    /// The LDAP attribute type this mapper writes.
    pub fn ldap_attribute(&self) -> &str {
        &self.ldap_attribute
    }
}

impl AttributeMapper for SimpleMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        vec![self.ldap_attribute.clone()]
    }

    fn to_ldap(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()> {
        let attribute = object.get(&self.descriptor.schema, &self.descriptor.name);
        if let Some(value) = attribute.and_then(ScimAttribute::simple_value) {
            let raw = self.transform.to_ldap_value(&self.descriptor, value)?;
            entry.add_value(&self.ldap_attribute, raw);
        }
        Ok(())
    }

    fn to_scim(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>> {
        // A multi-valued LDAP attribute behind a simple SCIM mapping takes
        // the first value in server order.
        match entry.first_value(&self.ldap_attribute) {
            Some(raw) => {
                let value = self.transform.to_scim_value(&self.descriptor, raw)?;
                Ok(Some(ScimAttribute::simple(self.descriptor.clone(), value)))
            }
            None => Ok(None),
        }
    }

    fn to_ldap_filter(
        &self,
        op: FilterOp,
        sub: Option<&str>,
        value: Option<&str>,
    ) -> ScimResult<Option<String>> {
        if sub.is_some() {
            return Ok(None);
        }
        simple_filter_fragment(&self.ldap_attribute, self.transform.as_ref(), op, value).map(Some)
    }

    fn ldap_sort_attribute(&self, sub: Option<&str>) -> Option<String> {
        if sub.is_some() {
            return None;
        }
        Some(self.ldap_attribute.clone())
    }
}

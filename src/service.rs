//! The SCIM resource service over an LDAP directory.
//!
//! [`LdapResourceService`] is the crate's front door: create, get, query,
//! replace, patch, and delete operations on configured resource endpoints,
//! each translated into directory operations through the per-resource
//! [`ResourceMapper`]. Directory failures are mapped onto the SCIM error
//! table; everything else propagates unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::error::{ScimError, ScimResult};
use crate::filter::Filter;
use crate::ldap::{DirectoryClient, Entry};
use crate::mapper::ResourceMapper;
use crate::resource::{
    AttributeValue, ComplexValue, ListResponse, PageParameters, QueryAttributes, RequestContext,
    ScimAttribute, ScimObject, SimpleValue, SortParameters,
};
use crate::schema::ResourceDescriptor;

/// Weak entity tag for an entry, hashed over its DN and every mapped
/// attribute value. Stable across value reordering.
pub fn entry_version(entry: &Entry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.dn.to_lowercase().as_bytes());
    for attribute in entry.attributes() {
        hasher.update(attribute.name.to_lowercase().as_bytes());
        let mut values = attribute.values.clone();
        values.sort();
        for value in values {
            hasher.update(&value);
        }
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("W/\"{hex}\"")
}

/// SCIM resource operations backed by a directory.
pub struct LdapResourceService {
    mappers: HashMap<String, Arc<ResourceMapper>>,
    client: Arc<dyn DirectoryClient>,
}

impl LdapResourceService {
    /// Create a service from configured resource mappers and a directory
    /// client.
    pub fn new(mappers: Vec<Arc<ResourceMapper>>, client: Arc<dyn DirectoryClient>) -> Self {
        let mappers = mappers
            .into_iter()
            .map(|m| (m.resource().endpoint.to_lowercase(), m))
            .collect();
        Self { mappers, client }
    }

    /// The mapper serving an endpoint.
    pub fn mapper(&self, endpoint: &str) -> ScimResult<&Arc<ResourceMapper>> {
        self.mappers
            .get(&endpoint.to_lowercase())
            .ok_or_else(|| ScimError::not_found(format!("unknown endpoint '{endpoint}'")))
    }

    /// Create a resource, returning its mapped server-side state.
    pub async fn create(
        &self,
        endpoint: &str,
        object: &ScimObject,
        query: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        let mapper = self.mapper(endpoint)?;
        let entry = mapper.to_ldap_entry(object)?;
        self.client.add(&entry, ctx).await?;
        info!(
            "request {}: created {} at {}",
            ctx.request_id,
            mapper.resource().name,
            entry.dn
        );
        // Read back so operational attributes and directory-side rewrites
        // show up in the response.
        let attributes = mapper.ldap_attribute_types(&QueryAttributes::all());
        let created = self
            .client
            .read(&entry.dn, &attributes, ctx)
            .await?
            .unwrap_or(entry);
        let mapped = mapper
            .to_scim_object(&created, query, self.client.as_ref(), ctx)
            .await?
            .ok_or_else(|| {
                ScimError::internal("created entry is hidden by the resource search filter")
            })?;
        Ok(self.with_version(mapper.resource(), &created, query, mapped))
    }

    /// Fetch one resource by id.
    pub async fn get(
        &self,
        endpoint: &str,
        id: &str,
        query: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        let mapper = self.mapper(endpoint)?;
        let attributes = mapper.ldap_attribute_types(&QueryAttributes::all());
        let entry = mapper
            .resolve_id(id, &attributes, self.client.as_ref(), ctx)
            .await?;
        let mapped = mapper
            .to_scim_object(&entry, query, self.client.as_ref(), ctx)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("no resource with id '{id}'")))?;
        Ok(self.with_version(mapper.resource(), &entry, query, mapped))
    }

    /// Query an endpoint with optional filter, sort, and paging.
    pub async fn query(
        &self,
        endpoint: &str,
        filter: Option<&str>,
        sort: Option<&SortParameters>,
        page: Option<PageParameters>,
        query: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ListResponse> {
        let mapper = self.mapper(endpoint)?;
        let parsed = filter.map(Filter::parse).transpose()?;
        debug!(
            "request {}: query {} filter={:?}",
            ctx.request_id, endpoint, filter
        );
        mapper
            .query(
                parsed.as_ref(),
                sort,
                page,
                query,
                self.client.as_ref(),
                ctx,
            )
            .await
    }

    /// Replace a resource's mapped attributes wholesale.
    ///
    /// When `expected_version` is given, the entry's current version must
    /// match or the operation fails with `PreconditionFailed`.
    pub async fn replace(
        &self,
        endpoint: &str,
        id: &str,
        object: &ScimObject,
        expected_version: Option<&str>,
        query: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        let mapper = self.mapper(endpoint)?;
        let attributes = mapper.ldap_attribute_types(&QueryAttributes::all());
        let current = mapper
            .resolve_id(id, &attributes, self.client.as_ref(), ctx)
            .await?;
        self.check_version(&current, expected_version)?;
        let modifications = mapper.to_ldap_modifications(&current, object)?;
        if modifications.is_empty() {
            debug!("request {}: replace of {id} is a no-op", ctx.request_id);
        } else {
            self.client
                .modify(&current.dn, &modifications, ctx)
                .await?;
            info!(
                "request {}: replaced {} ({} modifications)",
                ctx.request_id,
                current.dn,
                modifications.len()
            );
        }
        self.reread(mapper, &current.dn, &attributes, query, ctx).await
    }

    /// Apply a partial update to a resource.
    ///
    /// Attributes present in the patch replace or merge into the stored
    /// state; plural elements whose `operation` is `delete` remove the
    /// matching value; `meta.attributes` names attributes to clear.
    pub async fn patch(
        &self,
        endpoint: &str,
        id: &str,
        patch: &ScimObject,
        expected_version: Option<&str>,
        query: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        let mapper = self.mapper(endpoint)?;
        let attributes = mapper.ldap_attribute_types(&QueryAttributes::all());
        let current = mapper
            .resolve_id(id, &attributes, self.client.as_ref(), ctx)
            .await?;
        self.check_version(&current, expected_version)?;
        let current_object = mapper
            .to_scim_object(&current, &QueryAttributes::all(), self.client.as_ref(), ctx)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("no resource with id '{id}'")))?;
        let merged = apply_patch(mapper.resource(), &current_object, patch);
        let modifications = mapper.to_ldap_modifications(&current, &merged)?;
        if !modifications.is_empty() {
            self.client
                .modify(&current.dn, &modifications, ctx)
                .await?;
            info!(
                "request {}: patched {} ({} modifications)",
                ctx.request_id,
                current.dn,
                modifications.len()
            );
        }
        self.reread(mapper, &current.dn, &attributes, query, ctx).await
    }

    /// Delete a resource by id.
    pub async fn delete(&self, endpoint: &str, id: &str, ctx: &RequestContext) -> ScimResult<()> {
        let mapper = self.mapper(endpoint)?;
        let attributes = vec!["objectClass".to_string()];
        let entry = mapper
            .resolve_id(id, &attributes, self.client.as_ref(), ctx)
            .await?;
        self.client.delete(&entry.dn, ctx).await?;
        info!("request {}: deleted {}", ctx.request_id, entry.dn);
        Ok(())
    }

    /// The static service-provider configuration document.
    pub fn service_provider_config(&self) -> Value {
        json!({
            "schemas": ["urn:scim:schemas:core:1.0"],
            "patch": { "supported": true },
            "bulk": { "supported": false },
            "filter": { "supported": true },
            "changePassword": { "supported": false },
            "sort": { "supported": true },
            "etag": { "supported": true },
            "xmlDataFormat": { "supported": true },
            "authenticationSchemes": []
        })
    }

    fn check_version(&self, current: &Entry, expected: Option<&str>) -> ScimResult<()> {
        let Some(expected) = expected else {
            return Ok(());
        };
        let actual = entry_version(current);
        if actual != expected {
            warn!(
                "version mismatch on {}: expected {expected}, found {actual}",
                current.dn
            );
            return Err(ScimError::PreconditionFailed(format!(
                "expected version {expected}, found {actual}"
            )));
        }
        Ok(())
    }

    async fn reread(
        &self,
        mapper: &Arc<ResourceMapper>,
        dn: &str,
        attributes: &[String],
        query: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        let entry = self
            .client
            .read(dn, attributes, ctx)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("entry vanished: {dn}")))?;
        let mapped = mapper
            .to_scim_object(&entry, query, self.client.as_ref(), ctx)
            .await?
            .ok_or_else(|| ScimError::not_found(format!("entry vanished: {dn}")))?;
        Ok(self.with_version(mapper.resource(), &entry, query, mapped))
    }

    /// Stamp `meta.version` onto a mapped object when the resource carries a
    /// versioned `meta` descriptor and the request asked for it.
    fn with_version(
        &self,
        resource: &Arc<ResourceDescriptor>,
        entry: &Entry,
        query: &QueryAttributes,
        mut object: ScimObject,
    ) -> ScimObject {
        let Some(meta_descriptor) = resource.core_attribute("meta") else {
            return object;
        };
        let Some(version_descriptor) = meta_descriptor.sub_attribute("version") else {
            return object;
        };
        if !query.is_sub_requested(&resource.schema, "meta", "version") {
            return object;
        }
        let mut complex = object
            .get(&resource.schema, "meta")
            .and_then(|attr| attr.complex_value().cloned())
            .unwrap_or_default();
        complex.insert(ScimAttribute::simple(
            version_descriptor.clone(),
            SimpleValue::String(entry_version(entry)),
        ));
        object.add(ScimAttribute::singular(
            meta_descriptor.clone(),
            AttributeValue::Complex(complex),
        ));
        object
    }
}

fn element_value_key(element: &AttributeValue) -> Option<String> {
    match element {
        AttributeValue::Simple(value) => Some(value.to_wire_string()),
        AttributeValue::Complex(complex) => {
            complex.simple_value("value").map(SimpleValue::to_wire_string)
        }
    }
}

fn is_delete_marked(element: &AttributeValue) -> bool {
    element
        .as_complex()
        .and_then(|complex| complex.simple_value("operation"))
        .and_then(SimpleValue::as_str)
        .is_some_and(|op| op.eq_ignore_ascii_case("delete"))
}

/// Merge a patch object into the current resource state.
fn apply_patch(
    resource: &Arc<ResourceDescriptor>,
    current: &ScimObject,
    patch: &ScimObject,
) -> ScimObject {
    let mut merged = current.clone();
    for attribute in patch.attributes() {
        let descriptor = attribute.descriptor();
        if descriptor.schema.eq_ignore_ascii_case(&resource.schema)
            && descriptor.name.eq_ignore_ascii_case("meta")
        {
            continue;
        }
        if attribute.is_plural() {
            merge_plural(&mut merged, attribute);
        } else if let Some(patch_complex) = attribute.complex_value() {
            // Complex singular attributes merge sub-attribute-wise.
            let mut base = merged
                .get(&descriptor.schema, &descriptor.name)
                .and_then(|attr| attr.complex_value().cloned())
                .unwrap_or_default();
            for sub in patch_complex.iter() {
                base.insert(sub.clone());
            }
            merged.add(ScimAttribute::singular(
                descriptor.clone(),
                AttributeValue::Complex(base),
            ));
        } else {
            merged.add(attribute.clone());
        }
    }
    merged
}

/// Plural patch semantics: elements replace same-valued elements, append
/// otherwise, and `operation: delete` removes the matching value.
fn merge_plural(merged: &mut ScimObject, patch_attribute: &ScimAttribute) {
    let descriptor = patch_attribute.descriptor();
    let mut elements: Vec<AttributeValue> = merged
        .get(&descriptor.schema, &descriptor.name)
        .map(|attr| attr.values().to_vec())
        .unwrap_or_default();
    for element in patch_attribute.values() {
        let key = element_value_key(element);
        if let Some(key) = &key {
            elements.retain(|existing| element_value_key(existing).as_ref() != Some(key));
        }
        if !is_delete_marked(element) {
            elements.push(strip_operation(element));
        }
    }
    if elements.is_empty() {
        merged.remove(&descriptor.schema, &descriptor.name);
    } else {
        merged.add(ScimAttribute::plural(descriptor.clone(), elements));
    }
}

/// Drop the transient `operation` sub-attribute before storing an element.
fn strip_operation(element: &AttributeValue) -> AttributeValue {
    match element {
        AttributeValue::Simple(_) => element.clone(),
        AttributeValue::Complex(complex) => {
            let kept: ComplexValue = complex
                .iter()
                .filter(|sub| !sub.descriptor().name.eq_ignore_ascii_case("operation"))
                .cloned()
                .collect();
            AttributeValue::Complex(kept)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_version_is_stable_across_value_order() {
        let mut a = Entry::new("uid=x,dc=example,dc=com");
        a.add_str_value("mail", "one@x.com");
        a.add_str_value("mail", "two@x.com");
        let mut b = Entry::new("UID=x, dc=example, dc=com".replace(", ", ","));
        b.add_str_value("mail", "two@x.com");
        b.add_str_value("mail", "one@x.com");
        assert_eq!(entry_version(&a), entry_version(&b));

        let mut c = Entry::new("uid=x,dc=example,dc=com");
        c.add_str_value("mail", "three@x.com");
        assert_ne!(entry_version(&a), entry_version(&c));
    }

    #[test]
    fn version_strings_are_weak_etags() {
        let entry = Entry::new("uid=x,dc=example,dc=com");
        let version = entry_version(&entry);
        assert!(version.starts_with("W/\"") && version.ends_with('"'));
    }
}

//! Per-resource translation between SCIM operations and LDAP operations.
//!
//! A [`ResourceMapper`] glues one resource's configuration together: its
//! attribute mappers, derived attributes, DN template, fixed attributes, and
//! search parameters. Mappers are immutable after configuration load and
//! shared across concurrent request handlers.

use std::sync::Arc;

use log::debug;

use crate::error::{ScimError, ScimResult};
use crate::filter::{AttributePath, Filter};
use crate::ldap::filter::escape_value;
use crate::ldap::{DirectoryClient, Entry, LdapFilter, Modification, SearchScope, SortKey};
use crate::mapping::{
    AttributeMapper, DerivedAttribute, DnTemplate, FixedAttribute, diff_modifications,
};
use crate::resource::{
    AttributeValue, ComplexValue, ListResponse, PageParameters, QueryAttributes, RequestContext,
    ScimAttribute, ScimObject, SortParameters,
};
use crate::schema::ResourceDescriptor;

/// How the resource's entries are located in the directory.
pub struct SearchParameters {
    /// Search base DN
    pub base_dn: String,
    /// Search scope under the base
    pub scope: SearchScope,
    /// LDAP filter restricting which entries are visible as this resource
    pub filter: LdapFilter,
    /// LDAP attribute type holding the SCIM `id`
    pub id_attribute: String,
    /// Hard cap on the page size a query may return
    pub max_results: usize,
}

/// How new entries of this resource are created.
pub struct AddParameters {
    /// Template producing the new entry's DN from staged attributes
    pub dn_template: DnTemplate,
    /// Attributes stamped onto every created entry
    pub fixed_attributes: Vec<FixedAttribute>,
}

/// The outcome of translating a SCIM filter to LDAP.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedFilter {
    /// The LDAP filter string to search with
    pub filter: String,
    /// Whether the translation covered the whole SCIM filter; when `false`
    /// the results must be re-filtered in memory
    pub complete: bool,
}

/// End-to-end SCIM↔LDAP translation for one resource type.
pub struct ResourceMapper {
    resource: Arc<ResourceDescriptor>,
    search: SearchParameters,
    add: AddParameters,
    mappers: Vec<Arc<dyn AttributeMapper>>,
    derived: Vec<Arc<dyn DerivedAttribute>>,
}

impl ResourceMapper {
    /// Assemble a mapper from its configured parts.
    pub fn new(
        resource: Arc<ResourceDescriptor>,
        search: SearchParameters,
        add: AddParameters,
        mappers: Vec<Arc<dyn AttributeMapper>>,
        derived: Vec<Arc<dyn DerivedAttribute>>,
    ) -> Self {
        Self {
            resource,
            search,
            add,
            mappers,
            derived,
        }
    }

    /// The resource this mapper serves.
    pub fn resource(&self) -> &Arc<ResourceDescriptor> {
        &self.resource
    }

    /// The search base DN for this resource.
    pub fn search_base_dn(&self) -> &str {
        &self.search.base_dn
    }

    /// The LDAP attribute type carrying the SCIM `id`.
    pub fn id_attribute(&self) -> &str {
        &self.search.id_attribute
    }

    fn mapper_for(&self, path: &AttributePath) -> Option<&Arc<dyn AttributeMapper>> {
        let schema = path.schema.as_deref().unwrap_or(&self.resource.schema);
        self.mappers.iter().find(|m| {
            let descriptor = m.descriptor();
            descriptor.schema.eq_ignore_ascii_case(schema)
                && descriptor.name.eq_ignore_ascii_case(&path.name)
        })
    }

    /// The LDAP attribute types a search for the requested attributes needs:
    /// the union over requested mappers and derived attributes, plus
    /// `objectClass` and the id attribute.
    pub fn ldap_attribute_types(&self, query: &QueryAttributes) -> Vec<String> {
        let mut types: Vec<String> = vec!["objectClass".into(), self.search.id_attribute.clone()];
        let mut push_unique = |wanted: Vec<String>, types: &mut Vec<String>| {
            for t in wanted {
                if !types.iter().any(|seen| seen.eq_ignore_ascii_case(&t)) {
                    types.push(t);
                }
            }
        };
        for mapper in &self.mappers {
            let descriptor = mapper.descriptor();
            if query.is_requested(&descriptor.schema, &descriptor.name) {
                push_unique(mapper.ldap_attribute_types(), &mut types);
            }
        }
        for derived in &self.derived {
            let descriptor = derived.descriptor();
            if query.is_requested(&descriptor.schema, &descriptor.name) {
                push_unique(derived.ldap_attribute_types(), &mut types);
            }
        }
        types
    }

    fn check_required(&self, object: &ScimObject) -> ScimResult<()> {
        for mapper in &self.mappers {
            let descriptor = mapper.descriptor();
            if descriptor.required
                && object.get(&descriptor.schema, &descriptor.name).is_none()
            {
                return Err(ScimError::invalid_resource(format!(
                    "missing required attribute '{}'",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }

    /// Build the LDAP entry an incoming resource creates: mapper output,
    /// then fixed attributes, then the templated DN.
    pub fn to_ldap_entry(&self, object: &ScimObject) -> ScimResult<Entry> {
        self.check_required(object)?;
        let mut entry = Entry::new("");
        for mapper in &self.mappers {
            mapper.to_ldap(object, &mut entry)?;
        }
        for fixed in &self.add.fixed_attributes {
            fixed.apply(&mut entry);
        }
        entry.dn = self.add.dn_template.construct(&entry)?;
        Ok(entry)
    }

    /// Diff the current entry against the mapped target state of `object`,
    /// restricted to mapper-owned attribute types.
    pub fn to_ldap_modifications(
        &self,
        current: &Entry,
        object: &ScimObject,
    ) -> ScimResult<Vec<Modification>> {
        self.check_required(object)?;
        let mut target = Entry::new(current.dn.clone());
        for mapper in &self.mappers {
            mapper.to_ldap(object, &mut target)?;
        }
        let mut owned: Vec<String> = Vec::new();
        for mapper in &self.mappers {
            for t in mapper.ldap_attribute_types() {
                if !owned.iter().any(|seen| seen.eq_ignore_ascii_case(&t)) {
                    owned.push(t);
                }
            }
        }
        Ok(diff_modifications(current, &target, &owned))
    }

    /// Translate a SCIM filter into the LDAP filter to search with.
    ///
    /// Leaves that do not resolve to a mapper have no translation. An `or`
    /// with an untranslatable child widens to no contribution at all, an
    /// `and` drops only the untranslatable child; either way the result is a
    /// superset of the true matches and `complete` is `false`, telling the
    /// query pipeline to re-apply the SCIM filter in memory. The resource's
    /// search filter always guards the final translation.
    pub fn to_ldap_filter(&self, filter: Option<&Filter>) -> ScimResult<TranslatedFilter> {
        let search_filter = self.search.filter.to_string();
        let Some(filter) = filter else {
            return Ok(TranslatedFilter {
                filter: search_filter,
                complete: true,
            });
        };
        let mut dropped = false;
        let translated = self.translate(filter, &mut dropped)?;
        Ok(match translated {
            Some(fragment) => TranslatedFilter {
                filter: format!("(&{fragment}{search_filter})"),
                complete: !dropped,
            },
            None => {
                debug!("filter has no LDAP translation, falling back to the search filter");
                TranslatedFilter {
                    filter: search_filter,
                    complete: false,
                }
            }
        })
    }

    fn translate(&self, filter: &Filter, dropped: &mut bool) -> ScimResult<Option<String>> {
        match filter {
            Filter::And(children) => {
                let mut fragments = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(fragment) = self.translate(child, dropped)? {
                        fragments.push(fragment);
                    }
                }
                Ok(match fragments.len() {
                    0 => None,
                    1 => fragments.pop(),
                    _ => Some(format!("(&{})", fragments.concat())),
                })
            }
            Filter::Or(children) => {
                let mut fragments = Vec::with_capacity(children.len());
                for child in children {
                    match self.translate(child, dropped)? {
                        Some(fragment) => fragments.push(fragment),
                        // One untranslatable branch makes the whole
                        // disjunction unbounded; widen it away entirely.
                        None => {
                            *dropped = true;
                            return Ok(None);
                        }
                    }
                }
                Ok(match fragments.len() {
                    0 => None,
                    1 => fragments.pop(),
                    _ => Some(format!("(|{})", fragments.concat())),
                })
            }
            Filter::Compare { path, op, value } => match self.mapper_for(path) {
                Some(mapper) => {
                    let fragment =
                        mapper.to_ldap_filter(*op, path.sub.as_deref(), value.as_deref())?;
                    if fragment.is_none() {
                        *dropped = true;
                    }
                    Ok(fragment)
                }
                None => {
                    *dropped = true;
                    Ok(None)
                }
            },
        }
    }

    /// Resolve a sort request to a server-side sort key.
    pub fn to_sort_key(&self, sort: &SortParameters) -> ScimResult<SortKey> {
        let attribute = self
            .mapper_for(&sort.path)
            .and_then(|mapper| mapper.ldap_sort_attribute(sort.path.sub.as_deref()))
            .ok_or_else(|| {
                ScimError::InvalidSort(format!("cannot sort on '{}'", sort.path))
            })?;
        Ok(SortKey {
            attribute,
            ascending: sort.ascending,
        })
    }

    /// Map a directory entry to a SCIM object.
    ///
    /// Returns `None` when the entry does not match the resource's search
    /// filter (hidden entries stay hidden even when read directly). Derived
    /// attributes may issue secondary lookups through `client`.
    pub async fn to_scim_object(
        &self,
        entry: &Entry,
        query: &QueryAttributes,
        client: &dyn DirectoryClient,
        ctx: &RequestContext,
    ) -> ScimResult<Option<ScimObject>> {
        if !self.search.filter.matches(entry) {
            return Ok(None);
        }
        let mut object = ScimObject::new();
        // `id` is the resource's identity; it is returned regardless of the
        // requested attribute set.
        if let Some(id_descriptor) = self.resource.core_attribute("id") {
            if let Some(id) = entry.first_value_str(&self.search.id_attribute) {
                object.add(ScimAttribute::simple(id_descriptor.clone(), id.into()));
            }
        }
        for mapper in &self.mappers {
            let descriptor = mapper.descriptor();
            if !query.is_requested(&descriptor.schema, &descriptor.name) {
                continue;
            }
            if let Some(attribute) = mapper.to_scim(entry)? {
                object.add(attribute);
            }
        }
        for derived in &self.derived {
            let descriptor = derived.descriptor();
            if !query.is_requested(&descriptor.schema, &descriptor.name) {
                continue;
            }
            if let Some(attribute) = derived
                .to_scim(entry, client, &self.search.base_dn, ctx)
                .await?
            {
                object.add(attribute);
            }
        }
        Ok(Some(project_object(&object, &self.resource.schema, query)))
    }

    /// Locate the entry whose id attribute matches `id`, fetching the given
    /// attribute types. Entries outside the search filter do not exist as
    /// far as the resource is concerned.
    pub async fn resolve_id(
        &self,
        id: &str,
        attributes: &[String],
        client: &dyn DirectoryClient,
        ctx: &RequestContext,
    ) -> ScimResult<Entry> {
        let filter = format!(
            "(&{}({}={}))",
            self.search.filter,
            self.search.id_attribute,
            escape_value(id)
        );
        let mut entries = client
            .search(
                &self.search.base_dn,
                self.search.scope,
                &filter,
                attributes,
                None,
                ctx,
            )
            .await?;
        if entries.is_empty() {
            return Err(ScimError::not_found(format!(
                "no {} resource with id '{id}'",
                self.resource.name
            )));
        }
        Ok(entries.swap_remove(0))
    }

    /// Execute the query pipeline: translate the filter, search, map
    /// entries, post-filter in memory when the translation is lossy, then
    /// page.
    pub async fn query(
        &self,
        filter: Option<&Filter>,
        sort: Option<&SortParameters>,
        page: Option<PageParameters>,
        query: &QueryAttributes,
        client: &dyn DirectoryClient,
        ctx: &RequestContext,
    ) -> ScimResult<ListResponse> {
        let translated = self.to_ldap_filter(filter)?;
        let sort_key = sort.map(|s| self.to_sort_key(s)).transpose()?;
        // Strict gt/lt widen to >=/<= on the LDAP side, so those results
        // need the in-memory correction too.
        let post_filter = !translated.complete
            || filter.is_some_and(Filter::contains_strict_inequality);
        let attributes = if post_filter {
            self.ldap_attribute_types(&QueryAttributes::all())
        } else {
            self.ldap_attribute_types(query)
        };
        debug!(
            "searching {} scope={:?} filter={} post_filter={post_filter}",
            self.search.base_dn, self.search.scope, translated.filter
        );
        let entries = client
            .search(
                &self.search.base_dn,
                self.search.scope,
                &translated.filter,
                &attributes,
                sort_key.as_ref(),
                ctx,
            )
            .await?;

        let mut objects = Vec::new();
        for entry in &entries {
            let mapped = if post_filter {
                // Map everything so the SCIM filter can see attributes the
                // request did not ask for, then trim to the request.
                let Some(full) = self
                    .to_scim_object(entry, &QueryAttributes::all(), client, ctx)
                    .await?
                else {
                    continue;
                };
                if let Some(filter) = filter {
                    if !filter.matches(&full, &self.resource) {
                        continue;
                    }
                }
                Some(project_object(&full, &self.resource.schema, query))
            } else {
                self.to_scim_object(entry, query, client, ctx).await?
            };
            if let Some(object) = mapped {
                objects.push(object);
            }
        }

        let total_results = objects.len();
        let (start_index, count) = match page {
            Some(page) => (
                page.start_index,
                page.count.min(self.search.max_results),
            ),
            None => (1, self.search.max_results),
        };
        let resources = objects
            .into_iter()
            .skip(start_index.saturating_sub(1))
            .take(count)
            .collect();
        Ok(ListResponse {
            resources,
            total_results,
            start_index,
        })
    }
}

/// Trim an object to the requested attribute set, including sub-attribute
/// selections. The `id` attribute always survives.
pub(crate) fn project_object(
    object: &ScimObject,
    core_schema: &str,
    query: &QueryAttributes,
) -> ScimObject {
    if query.is_all() {
        return object.clone();
    }
    let mut projected = ScimObject::new();
    for attribute in object.attributes() {
        let descriptor = attribute.descriptor();
        let is_id = descriptor.schema.eq_ignore_ascii_case(core_schema)
            && descriptor.name.eq_ignore_ascii_case("id");
        if is_id {
            projected.add(attribute.clone());
            continue;
        }
        if !query.is_requested(&descriptor.schema, &descriptor.name) {
            continue;
        }
        projected.add(project_attribute(attribute, query));
    }
    projected
}

fn project_attribute(attribute: &ScimAttribute, query: &QueryAttributes) -> ScimAttribute {
    let descriptor = attribute.descriptor();
    let project_value = |value: &AttributeValue| -> AttributeValue {
        match value {
            AttributeValue::Simple(simple) => AttributeValue::Simple(simple.clone()),
            AttributeValue::Complex(complex) => {
                let kept: ComplexValue = complex
                    .iter()
                    .filter(|sub| {
                        query.is_sub_requested(
                            &descriptor.schema,
                            &descriptor.name,
                            &sub.descriptor().name,
                        )
                    })
                    .cloned()
                    .collect();
                AttributeValue::Complex(kept)
            }
        }
    };
    if attribute.is_plural() {
        ScimAttribute::plural(
            descriptor.clone(),
            attribute.values().iter().map(project_value).collect(),
        )
    } else {
        match attribute.singular_value() {
            Some(value) => ScimAttribute::singular(descriptor.clone(), project_value(value)),
            None => attribute.clone(),
        }
    }
}

//! Derived attributes: SCIM attributes computed from the entry or from
//! secondary directory lookups rather than a direct mapping.
//!
//! Implementations register in a [`DerivationRegistry`] under a short name
//! that the configuration references; unknown names fail configuration
//! load. Each derivation declares the LDAP attribute types it consumes so
//! the resource mapper can request them on the primary search.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScimResult;
use crate::ldap::filter::escape_value;
use crate::ldap::{DirectoryClient, Entry, SearchScope};
use crate::resource::{AttributeValue, ComplexValue, RequestContext, ScimAttribute, SimpleValue};
use crate::schema::AttributeDescriptor;
use crate::transform::parse_generalized_time;

/// A named computation producing one SCIM attribute for an entry.
#[async_trait]
pub trait DerivedAttribute: Send + Sync {
    /// The descriptor of the attribute this derivation produces.
    fn descriptor(&self) -> &Arc<AttributeDescriptor>;

    /// LDAP attribute types the derivation reads from the primary entry.
    fn ldap_attribute_types(&self) -> Vec<String>;

    /// Compute the attribute; `None` when it has no value for this entry.
    async fn to_scim(
        &self,
        entry: &Entry,
        client: &dyn DirectoryClient,
        search_base_dn: &str,
        ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>>;
}

/// Factory producing a derivation for the descriptor the configuration
/// declares it under.
pub type DerivationFactory =
    Box<dyn Fn(Arc<AttributeDescriptor>) -> Arc<dyn DerivedAttribute> + Send + Sync>;

/// The closed, name-keyed derivation catalog.
pub struct DerivationRegistry {
    factories: HashMap<String, DerivationFactory>,
}

impl DerivationRegistry {
    /// A registry holding the built-in derivations `meta`, `groups`, and
    /// `members`.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("meta", Box::new(|d| Arc::new(MetaDerivation::new(d))));
        registry.register("groups", Box::new(|d| Arc::new(GroupsDerivation::new(d))));
        registry.register("members", Box::new(|d| Arc::new(MembersDerivation::new(d))));
        registry
    }

    /// Register a derivation factory under a short name. Names compare
    /// case-insensitively.
    pub fn register(&mut self, name: &str, factory: DerivationFactory) {
        self.factories.insert(name.to_lowercase(), factory);
    }

    /// Instantiate the named derivation for a descriptor.
    pub fn create(
        &self,
        name: &str,
        descriptor: Arc<AttributeDescriptor>,
    ) -> Option<Arc<dyn DerivedAttribute>> {
        self.factories
            .get(&name.to_lowercase())
            .map(|factory| factory(descriptor))
    }
}

impl Default for DerivationRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Builds the complex `meta` attribute from the directory's operational
/// timestamps.
pub struct MetaDerivation {
    descriptor: Arc<AttributeDescriptor>,
}

impl MetaDerivation {
    /// Create the derivation for the configured `meta` descriptor.
    pub fn new(descriptor: Arc<AttributeDescriptor>) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl DerivedAttribute for MetaDerivation {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        vec!["createTimestamp".to_string(), "modifyTimestamp".to_string()]
    }

    async fn to_scim(
        &self,
        entry: &Entry,
        _client: &dyn DirectoryClient,
        _search_base_dn: &str,
        _ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>> {
        let mut complex = ComplexValue::new();
        for (operational, sub_name) in [
            ("createTimestamp", "created"),
            ("modifyTimestamp", "lastModified"),
        ] {
            let Some(sub_descriptor) = self.descriptor.sub_attribute(sub_name) else {
                continue;
            };
            if let Some(raw) = entry.first_value_str(operational) {
                if let Some(instant) = parse_generalized_time(&raw) {
                    complex.insert(ScimAttribute::simple(
                        sub_descriptor.clone(),
                        SimpleValue::DateTime(instant),
                    ));
                }
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
}

fn membership_element(
    descriptor: &AttributeDescriptor,
    value: String,
    display: Option<String>,
) -> AttributeValue {
    let mut complex = ComplexValue::new();
    if let Some(value_descriptor) = descriptor.sub_attribute("value") {
        complex.insert(ScimAttribute::simple(
            value_descriptor.clone(),
            SimpleValue::String(value),
        ));
    }
    if let (Some(display), Some(display_descriptor)) =
        (display, descriptor.sub_attribute("display"))
    {
        complex.insert(ScimAttribute::simple(
            display_descriptor.clone(),
            SimpleValue::String(display),
        ));
    }
    AttributeValue::Complex(complex)
}

/// Derives the groups an entry belongs to by secondary search on
/// `member`/`uniqueMember`.
pub struct GroupsDerivation {
    descriptor: Arc<AttributeDescriptor>,
}

impl GroupsDerivation {
    /// Create the derivation for the configured `groups` descriptor.
    pub fn new(descriptor: Arc<AttributeDescriptor>) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl DerivedAttribute for GroupsDerivation {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        Vec::new()
    }

    async fn to_scim(
        &self,
        entry: &Entry,
        client: &dyn DirectoryClient,
        search_base_dn: &str,
        ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>> {
        let dn = escape_value(&entry.dn);
        let filter = format!("(|(member={dn})(uniqueMember={dn}))");
        let groups = client
            .search(
                search_base_dn,
                SearchScope::Sub,
                &filter,
                &["cn".to_string()],
                None,
                ctx,
            )
            .await?;
        if groups.is_empty() {
            return Ok(None);
        }
        let elements = groups
            .into_iter()
            .map(|group| {
                let display = group.first_value_str("cn");
                membership_element(&self.descriptor, group.dn, display)
            })
            .collect();
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }
}

/// Derives a group's members from its `member`/`uniqueMember` DNs, resolving
/// each member's `cn` for display.
pub struct MembersDerivation {
    descriptor: Arc<AttributeDescriptor>,
}

impl MembersDerivation {
    /// Create the derivation for the configured `members` descriptor.
    pub fn new(descriptor: Arc<AttributeDescriptor>) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl DerivedAttribute for MembersDerivation {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        vec!["member".to_string(), "uniqueMember".to_string()]
    }

    async fn to_scim(
        &self,
        entry: &Entry,
        client: &dyn DirectoryClient,
        _search_base_dn: &str,
        ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>> {
        let mut member_dns = entry.string_values("member");
        member_dns.extend(entry.string_values("uniqueMember"));
        if member_dns.is_empty() {
            return Ok(None);
        }
        let mut elements = Vec::with_capacity(member_dns.len());
        for member_dn in member_dns {
            let display = client
                .read(&member_dn, &["cn".to_string()], ctx)
                .await?
                .and_then(|member| member.first_value_str("cn"));
            elements.push(membership_element(&self.descriptor, member_dn, display));
        }
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::InMemoryDirectory;
    use crate::schema::DataType;
    use chrono::{TimeZone, Utc};

    const CORE: &str = "urn:scim:schemas:core:1.0";

    fn meta_descriptor() -> Arc<AttributeDescriptor> {
        let subs = vec![
            Arc::new(AttributeDescriptor::simple(CORE, "created", DataType::DateTime)),
            Arc::new(AttributeDescriptor::simple(CORE, "lastModified", DataType::DateTime)),
            Arc::new(AttributeDescriptor::simple(CORE, "version", DataType::String)),
        ];
        Arc::new(AttributeDescriptor::complex(CORE, "meta", subs).read_only())
    }

    fn groups_descriptor() -> Arc<AttributeDescriptor> {
        let subs = vec![
            Arc::new(AttributeDescriptor::simple(CORE, "value", DataType::String)),
            Arc::new(AttributeDescriptor::simple(CORE, "display", DataType::String)),
        ];
        Arc::new(AttributeDescriptor::complex(CORE, "groups", subs).plural(vec![]))
    }

    #[tokio::test]
    async fn meta_derivation_parses_operational_timestamps() {
        let derivation = MetaDerivation::new(meta_descriptor());
        let mut entry = Entry::new("uid=a,dc=example,dc=com");
        entry.add_str_value("createTimestamp", "20200101000000.000Z");
        entry.add_str_value("modifyTimestamp", "20210601120000.000Z");
        let client = InMemoryDirectory::new();
        let ctx = RequestContext::with_generated_id();
        let attribute = derivation
            .to_scim(&entry, &client, "dc=example,dc=com", &ctx)
            .await
            .unwrap()
            .unwrap();
        let complex = attribute.complex_value().unwrap();
        assert_eq!(
            complex.simple_value("created"),
            Some(&SimpleValue::DateTime(
                Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
            ))
        );
        assert!(complex.get("lastModified").is_some());
    }

    #[tokio::test]
    async fn meta_derivation_is_absent_without_timestamps() {
        let derivation = MetaDerivation::new(meta_descriptor());
        let client = InMemoryDirectory::new();
        let ctx = RequestContext::with_generated_id();
        let result = derivation
            .to_scim(
                &Entry::new("uid=a,dc=example,dc=com"),
                &client,
                "dc=example,dc=com",
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn groups_derivation_finds_membership_by_secondary_search() {
        let user_dn = "uid=bjensen,ou=People,dc=example,dc=com";
        let mut group = Entry::new("cn=staff,ou=Groups,dc=example,dc=com");
        group.add_str_value("objectClass", "groupOfNames");
        group.add_str_value("cn", "staff");
        group.add_str_value("member", user_dn);
        let client = InMemoryDirectory::with_entries([group]);
        let ctx = RequestContext::with_generated_id();

        let derivation = GroupsDerivation::new(groups_descriptor());
        let attribute = derivation
            .to_scim(&Entry::new(user_dn), &client, "dc=example,dc=com", &ctx)
            .await
            .unwrap()
            .unwrap();
        let elements = attribute.values();
        assert_eq!(elements.len(), 1);
        let complex = elements[0].as_complex().unwrap();
        assert_eq!(
            complex.simple_value("value"),
            Some(&SimpleValue::String(
                "cn=staff,ou=Groups,dc=example,dc=com".into()
            ))
        );
        assert_eq!(
            complex.simple_value("display"),
            Some(&SimpleValue::String("staff".into()))
        );
    }

    #[tokio::test]
    async fn members_derivation_resolves_display_names() {
        let mut member = Entry::new("uid=bjensen,ou=People,dc=example,dc=com");
        member.add_str_value("cn", "Barbara Jensen");
        let client = InMemoryDirectory::with_entries([member]);
        let ctx = RequestContext::with_generated_id();

        let mut group = Entry::new("cn=staff,ou=Groups,dc=example,dc=com");
        group.add_str_value("member", "uid=bjensen,ou=People,dc=example,dc=com");

        let derivation = MembersDerivation::new(groups_descriptor());
        let attribute = derivation
            .to_scim(&group, &client, "dc=example,dc=com", &ctx)
            .await
            .unwrap()
            .unwrap();
        let complex = attribute.values()[0].as_complex().unwrap();
        assert_eq!(
            complex.simple_value("display"),
            Some(&SimpleValue::String("Barbara Jensen".into()))
        );
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let registry = DerivationRegistry::with_defaults();
        assert!(registry.create("meta", meta_descriptor()).is_some());
        assert!(registry.create("com.example.Members", groups_descriptor()).is_none());
    }
}

//! Mapper for plural attributes.

use std::sync::Arc;

use log::debug;

use crate::error::{ScimError, ScimResult};
use crate::filter::FilterOp;
use crate::ldap::Entry;
use crate::resource::{AttributeValue, ComplexValue, ScimAttribute, ScimObject, SimpleValue};
use crate::schema::AttributeDescriptor;
use crate::transform::Transformation;

use super::{AttributeMapper, simple_filter_fragment};

/// One canonical-type binding of a plural mapping, e.g. `work` → `mail`.
pub struct CanonicalVariant {
    /// The `type` tag this variant serves
    pub type_tag: String,
    /// LDAP attribute type holding values of this variant
    pub ldap_attribute: String,
    /// Value transformation for this variant
    pub transform: Arc<dyn Transformation>,
}

/// How a plural attribute is stored in the directory.
pub enum PluralBacking {
    /// One LDAP attribute type per canonical `type` tag
    Canonical(Vec<CanonicalVariant>),
    /// One multi-valued LDAP attribute; every value becomes one element
    MultiValued {
        /// The multi-valued LDAP attribute type
        ldap_attribute: String,
        /// Value transformation applied per value
        transform: Arc<dyn Transformation>,
    },
}

/// Maps a plural SCIM attribute onto its LDAP backing.
///
/// Elements are complex values carrying at least the `value` sub-attribute;
/// canonical backings also stamp the `type` tag.
pub struct PluralMapper {
    descriptor: Arc<AttributeDescriptor>,
    backing: PluralBacking,
}

impl PluralMapper {
    /// Create a plural mapper.
    pub fn new(descriptor: Arc<AttributeDescriptor>, backing: PluralBacking) -> Self {
        Self {
            descriptor,
            backing,
        }
    }

    fn value_descriptor(&self) -> ScimResult<&Arc<AttributeDescriptor>> {
        self.descriptor.sub_attribute("value").ok_or_else(|| {
            ScimError::internal(format!(
                "plural attribute '{}' lacks a 'value' sub-attribute",
                self.descriptor.name
            ))
        })
    }

    fn type_descriptor(&self) -> Option<&Arc<AttributeDescriptor>> {
        self.descriptor.sub_attribute("type")
    }

    /// The `(value, type)` pair of one plural element. Bare simple elements
    /// are treated as an untagged `value`.
    fn element_parts<'a>(
        element: &'a AttributeValue,
    ) -> (Option<&'a SimpleValue>, Option<&'a str>) {
        match element {
            AttributeValue::Simple(value) => (Some(value), None),
            AttributeValue::Complex(complex) => {
                let marked_deleted = complex
                    .simple_value("operation")
                    .and_then(SimpleValue::as_str)
                    .is_some_and(|op| op.eq_ignore_ascii_case("delete"));
                if marked_deleted {
                    return (None, None);
                }
                (
                    complex.simple_value("value"),
                    complex.simple_value("type").and_then(SimpleValue::as_str),
                )
            }
        }
    }

    fn make_element(
        &self,
        value: SimpleValue,
        type_tag: Option<&str>,
    ) -> ScimResult<AttributeValue> {
        let mut complex = ComplexValue::new();
        complex.insert(ScimAttribute::simple(self.value_descriptor()?.clone(), value));
        if let (Some(tag), Some(type_desc)) = (type_tag, self.type_descriptor()) {
            complex.insert(ScimAttribute::simple(
                type_desc.clone(),
                SimpleValue::String(tag.to_string()),
            ));
        }
        Ok(AttributeValue::Complex(complex))
    }
}

impl AttributeMapper for PluralMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        match &self.backing {
            PluralBacking::Canonical(variants) => {
                variants.iter().map(|v| v.ldap_attribute.clone()).collect()
            }
            PluralBacking::MultiValued { ldap_attribute, .. } => vec![ldap_attribute.clone()],
        }
    }

    fn to_ldap(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()> {
        let Some(attribute) = object.get(&self.descriptor.schema, &self.descriptor.name) else {
            return Ok(());
        };
        let value_descriptor = self.value_descriptor()?.clone();
        for element in attribute.values() {
            let (value, type_tag) = Self::element_parts(element);
            let Some(value) = value else {
                continue;
            };
            match &self.backing {
                PluralBacking::MultiValued {
                    ldap_attribute,
                    transform,
                } => {
                    let raw = transform.to_ldap_value(&value_descriptor, value)?;
                    entry.add_value(ldap_attribute, raw);
                }
                PluralBacking::Canonical(variants) => {
                    let variant = match type_tag {
                        Some(tag) => variants
                            .iter()
                            .find(|v| v.type_tag.eq_ignore_ascii_case(tag)),
                        None => variants.first(),
                    };
                    match variant {
                        Some(variant) => {
                            let raw =
                                variant.transform.to_ldap_value(&value_descriptor, value)?;
                            entry.add_value(&variant.ldap_attribute, raw);
                        }
                        None => {
                            debug!(
                                "dropping '{}' element with unmapped type {:?}",
                                self.descriptor.name, type_tag
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn to_scim(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>> {
        let value_descriptor = self.value_descriptor()?.clone();
        let mut elements = Vec::new();
        match &self.backing {
            PluralBacking::Canonical(variants) => {
                for variant in variants {
                    for raw in entry.values(&variant.ldap_attribute) {
                        let value =
                            variant.transform.to_scim_value(&value_descriptor, raw)?;
                        elements.push(self.make_element(value, Some(&variant.type_tag))?);
                    }
                }
            }
            PluralBacking::MultiValued {
                ldap_attribute,
                transform,
            } => {
                for raw in entry.values(ldap_attribute) {
                    let value = transform.to_scim_value(&value_descriptor, raw)?;
                    elements.push(self.make_element(value, None)?);
                }
            }
        }
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }

    fn to_ldap_filter(
        &self,
        op: FilterOp,
        sub: Option<&str>,
        value: Option<&str>,
    ) -> ScimResult<Option<String>> {
        // A sub-less plural path addresses the conventional `value`
        // sub-attribute.
        let sub = sub.unwrap_or("value");
        if sub.eq_ignore_ascii_case("value") {
            return match &self.backing {
                PluralBacking::MultiValued {
                    ldap_attribute,
                    transform,
                } => simple_filter_fragment(ldap_attribute, transform.as_ref(), op, value)
                    .map(Some),
                PluralBacking::Canonical(variants) => {
                    let mut fragments = Vec::with_capacity(variants.len());
                    for variant in variants {
                        fragments.push(simple_filter_fragment(
                            &variant.ldap_attribute,
                            variant.transform.as_ref(),
                            op,
                            value,
                        )?);
                    }
                    Ok(match fragments.len() {
                        0 => None,
                        1 => fragments.pop(),
                        _ => Some(format!("(|{})", fragments.concat())),
                    })
                }
            };
        }
        // Filtering on the type tag selects the variant's backing attribute.
        if sub.eq_ignore_ascii_case("type") && op == FilterOp::Eq {
            if let (PluralBacking::Canonical(variants), Some(tag)) = (&self.backing, value) {
                if let Some(variant) = variants
                    .iter()
                    .find(|v| v.type_tag.eq_ignore_ascii_case(tag))
                {
                    return Ok(Some(format!("({}=*)", variant.ldap_attribute)));
                }
            }
        }
        Ok(None)
    }

    fn ldap_sort_attribute(&self, sub: Option<&str>) -> Option<String> {
        let sub = sub.unwrap_or("value");
        if !sub.eq_ignore_ascii_case("value") {
            return None;
        }
        match &self.backing {
            PluralBacking::Canonical(variants) => {
                variants.first().map(|v| v.ldap_attribute.clone())
            }
            PluralBacking::MultiValued { ldap_attribute, .. } => Some(ldap_attribute.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use crate::transform::DefaultTransformation;

    const CORE: &str = "urn:scim:schemas:core:1.0";

    fn emails_descriptor() -> Arc<AttributeDescriptor> {
        let subs = ["value", "type", "primary", "display", "operation"]
            .into_iter()
            .map(|name| {
                let data_type = if name == "primary" {
                    DataType::Boolean
                } else {
                    DataType::String
                };
                Arc::new(AttributeDescriptor::simple(CORE, name, data_type))
            })
            .collect();
        Arc::new(
            AttributeDescriptor::complex(CORE, "emails", subs)
                .plural(vec!["work".into(), "home".into()]),
        )
    }

    fn canonical_mapper() -> PluralMapper {
        PluralMapper::new(
            emails_descriptor(),
            PluralBacking::Canonical(vec![
                CanonicalVariant {
                    type_tag: "work".into(),
                    ldap_attribute: "mail".into(),
                    transform: Arc::new(DefaultTransformation),
                },
                CanonicalVariant {
                    type_tag: "home".into(),
                    ldap_attribute: "mailAlternateAddress".into(),
                    transform: Arc::new(DefaultTransformation),
                },
            ]),
        )
    }

    fn element(mapper: &PluralMapper, value: &str, tag: Option<&str>) -> AttributeValue {
        mapper
            .make_element(SimpleValue::String(value.into()), tag)
            .unwrap()
    }

    #[test]
    fn canonical_backing_maps_each_type_tag_to_its_attribute() {
        let mapper = canonical_mapper();
        let mut object = ScimObject::new();
        object.add(ScimAttribute::plural(
            mapper.descriptor().clone(),
            vec![
                element(&mapper, "work@example.com", Some("work")),
                element(&mapper, "home@example.org", Some("home")),
            ],
        ));
        let mut entry = Entry::new("uid=a,dc=example,dc=com");
        mapper.to_ldap(&object, &mut entry).unwrap();
        assert_eq!(entry.string_values("mail"), vec!["work@example.com"]);
        assert_eq!(
            entry.string_values("mailAlternateAddress"),
            vec!["home@example.org"]
        );
    }

    #[test]
    fn to_scim_tags_elements_with_their_variant_type() {
        let mapper = canonical_mapper();
        let mut entry = Entry::new("uid=a,dc=example,dc=com");
        entry.add_str_value("mail", "work@example.com");
        let attribute = mapper.to_scim(&entry).unwrap().unwrap();
        assert!(attribute.is_plural());
        let elements = attribute.values();
        assert_eq!(elements.len(), 1);
        let complex = elements[0].as_complex().unwrap();
        assert_eq!(
            complex.simple_value("value"),
            Some(&SimpleValue::String("work@example.com".into()))
        );
        assert_eq!(
            complex.simple_value("type"),
            Some(&SimpleValue::String("work".into()))
        );
    }

    #[test]
    fn multi_valued_backing_yields_one_element_per_value() {
        let descriptor = emails_descriptor();
        let mapper = PluralMapper::new(
            descriptor,
            PluralBacking::MultiValued {
                ldap_attribute: "memberUid".into(),
                transform: Arc::new(DefaultTransformation),
            },
        );
        let mut entry = Entry::new("cn=staff,ou=Groups,dc=example,dc=com");
        entry.add_str_value("memberUid", "bjensen");
        entry.add_str_value("memberUid", "adoe");
        let attribute = mapper.to_scim(&entry).unwrap().unwrap();
        assert_eq!(attribute.values().len(), 2);
    }

    #[test]
    fn elements_marked_for_deletion_are_not_written() {
        let mapper = canonical_mapper();
        let mut complex = ComplexValue::new();
        complex.insert(ScimAttribute::simple(
            mapper.descriptor().sub_attribute("value").unwrap().clone(),
            "gone@example.com".into(),
        ));
        complex.insert(ScimAttribute::simple(
            mapper.descriptor().sub_attribute("operation").unwrap().clone(),
            "delete".into(),
        ));
        let mut object = ScimObject::new();
        object.add(ScimAttribute::plural(
            mapper.descriptor().clone(),
            vec![AttributeValue::Complex(complex)],
        ));
        let mut entry = Entry::new("uid=a,dc=example,dc=com");
        mapper.to_ldap(&object, &mut entry).unwrap();
        assert!(!entry.has_attribute("mail"));
    }

    #[test]
    fn value_filters_or_join_the_variants() {
        let mapper = canonical_mapper();
        let fragment = mapper
            .to_ldap_filter(FilterOp::Co, Some("value"), Some("example"))
            .unwrap()
            .unwrap();
        assert_eq!(
            fragment,
            "(|(mail=*example*)(mailAlternateAddress=*example*))"
        );
    }

    #[test]
    fn type_eq_filters_select_the_variant_presence() {
        let mapper = canonical_mapper();
        assert_eq!(
            mapper
                .to_ldap_filter(FilterOp::Eq, Some("type"), Some("work"))
                .unwrap()
                .as_deref(),
            Some("(mail=*)")
        );
        assert_eq!(
            mapper
                .to_ldap_filter(FilterOp::Eq, Some("type"), Some("fax"))
                .unwrap(),
            None
        );
        assert_eq!(
            mapper
                .to_ldap_filter(FilterOp::Eq, Some("primary"), Some("true"))
                .unwrap(),
            None
        );
    }
}

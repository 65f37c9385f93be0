//! The declarative mapping configuration document.
//!
//! A JSON document declares each resource: its schema URN, endpoint, LDAP
//! search and add parameters, and one shape subrecord per attribute binding
//! it to the directory. The loader turns the document into the immutable
//! descriptor catalog, attribute mappers, and resource mappers the service
//! runs on. Transformations and derivations are resolved against closed,
//! name-keyed registries; unknown names fail the load.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::ldap::{DirectoryClient, LdapFilter, SearchScope};
use crate::mapper::{AddParameters, ResourceMapper, SearchParameters};
use crate::mapping::{
    AttributeMapper, CanonicalVariant, ComplexMapper, ConflictPolicy, DerivationRegistry,
    DerivedAttribute, DnTemplate, FixedAttribute, PluralBacking, PluralMapper, SimpleMapper,
    SubAttributeBinding,
};
use crate::schema::{AttributeDescriptor, DataType, ResourceDescriptor, SchemaRegistry};
use crate::service::LdapResourceService;
use crate::transform::TransformationRegistry;

const DEFAULT_ID_ATTRIBUTE: &str = "entryUUID";
const DEFAULT_MAX_RESULTS: usize = 1000;

fn default_id_attribute() -> String {
    DEFAULT_ID_ATTRIBUTE.to_string()
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_transform() -> String {
    "default".to_string()
}

/// Root of the configuration document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Resource declarations
    pub resources: Vec<ResourceConfig>,
}

/// One resource declaration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Resource name (XML root element local name)
    pub name: String,
    /// Core schema URN
    pub schema: String,
    /// Endpoint path segment
    pub endpoint: String,
    /// Where and how entries are found
    pub ldap_search: LdapSearchConfig,
    /// How entries are created
    pub ldap_add: LdapAddConfig,
    /// Attribute declarations
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

/// Search parameters of a resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapSearchConfig {
    /// Search base DN
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    /// LDAP filter restricting visible entries
    pub filter: String,
    /// Search scope, `sub` when omitted
    #[serde(default)]
    pub scope: ScopeConfig,
    /// LDAP attribute carrying the SCIM id, `entryUUID` when omitted
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
    /// Cap on the page size a query may return
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

/// Configuration spelling of a search scope.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeConfig {
    /// The base entry only
    Base,
    /// Immediate children of the base
    One,
    /// The whole subtree
    #[default]
    Sub,
}

impl From<ScopeConfig> for SearchScope {
    fn from(scope: ScopeConfig) -> Self {
        match scope {
            ScopeConfig::Base => SearchScope::Base,
            ScopeConfig::One => SearchScope::One,
            ScopeConfig::Sub => SearchScope::Sub,
        }
    }
}

/// Add parameters of a resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapAddConfig {
    /// Template producing the new entry's DN
    pub dn_template: String,
    /// Attributes stamped onto every created entry
    #[serde(default)]
    pub fixed_attributes: Vec<FixedAttributeConfig>,
}

/// One fixed attribute declaration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedAttributeConfig {
    /// LDAP attribute type
    pub ldap_attribute: String,
    /// The fixed values
    pub fixed_values: Vec<String>,
    /// `MERGE`, `OVERWRITE`, or `PRESERVE`; `PRESERVE` when omitted
    pub on_conflict: Option<String>,
}

/// One attribute declaration, carrying exactly one shape subrecord.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConfig {
    /// Attribute name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Schema URN, the resource's core schema when omitted
    pub schema: Option<String>,
    /// Whether the attribute is server-managed
    #[serde(default)]
    pub read_only: bool,
    /// Whether the attribute must be present on create/replace
    #[serde(default)]
    pub required: bool,
    /// Singular simple shape
    pub simple: Option<SimpleShape>,
    /// Singular complex shape
    pub complex: Option<ComplexShape>,
    /// Plural simple shape
    pub simple_plural: Option<SimplePluralShape>,
    /// Plural complex shape
    pub complex_plural: Option<ComplexPluralShape>,
    /// Registered derivation computing this attribute
    pub derivation: Option<DerivationConfig>,
}

/// Shape of a singular simple attribute.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleShape {
    /// Value data type
    pub data_type: DataTypeConfig,
    /// Case-sensitive string matching
    #[serde(default)]
    pub case_exact: bool,
    /// LDAP binding, absent for unmapped attributes
    pub mapping: Option<MappingConfig>,
}

/// Shape of a singular complex attribute.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexShape {
    /// Sub-attribute declarations
    pub sub_attributes: Vec<SubAttributeConfig>,
    /// Per-sub-attribute LDAP bindings
    #[serde(default)]
    pub mappings: Vec<SubMappingConfig>,
}

/// Shape of a plural simple attribute.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplePluralShape {
    /// Element value data type
    pub data_type: DataTypeConfig,
    /// Case-sensitive string matching
    #[serde(default)]
    pub case_exact: bool,
    /// Recognized `type` tags
    #[serde(default)]
    pub plural_types: Vec<String>,
    /// The multi-valued LDAP binding
    pub mapping: Option<MappingConfig>,
}

/// Shape of a plural complex attribute.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexPluralShape {
    /// Recognized `type` tags
    #[serde(default)]
    pub plural_types: Vec<String>,
    /// Extra sub-attribute declarations beyond the standard five
    #[serde(default)]
    pub sub_attributes: Vec<SubAttributeConfig>,
    /// One LDAP binding per `type` tag
    #[serde(default)]
    pub mappings: Vec<PluralMappingConfig>,
}

/// A sub-attribute declaration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAttributeConfig {
    /// Sub-attribute name
    pub name: String,
    /// Value data type
    pub data_type: DataTypeConfig,
    /// Case-sensitive string matching
    #[serde(default)]
    pub case_exact: bool,
    /// Whether the sub-attribute is required inside its parent
    #[serde(default)]
    pub required: bool,
    /// Whether the sub-attribute is server-managed
    #[serde(default)]
    pub read_only: bool,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

/// A simple LDAP binding.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    /// LDAP attribute type
    pub ldap_attribute: String,
    /// Transformation registry name
    #[serde(default = "default_transform")]
    pub transform: String,
}

/// A sub-attribute LDAP binding.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubMappingConfig {
    /// The declared sub-attribute being bound
    pub sub_attribute: String,
    /// LDAP attribute type
    pub ldap_attribute: String,
    /// Transformation registry name
    #[serde(default = "default_transform")]
    pub transform: String,
}

/// A canonical-type LDAP binding of a plural attribute.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluralMappingConfig {
    /// The `type` tag this binding serves
    pub plural_type: String,
    /// LDAP attribute type
    pub ldap_attribute: String,
    /// Transformation registry name
    #[serde(default = "default_transform")]
    pub transform: String,
}

/// Reference to a registered derivation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationConfig {
    /// Derivation registry name
    pub name: String,
}

/// Configuration spelling of a data type.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataTypeConfig {
    /// String value
    String,
    /// Boolean value
    Boolean,
    /// Integer value
    Integer,
    /// Datetime value
    DateTime,
    /// Binary value
    Binary,
}

impl From<DataTypeConfig> for DataType {
    fn from(data_type: DataTypeConfig) -> Self {
        match data_type {
            DataTypeConfig::String => DataType::String,
            DataTypeConfig::Boolean => DataType::Boolean,
            DataTypeConfig::Integer => DataType::Integer,
            DataTypeConfig::DateTime => DataType::DateTime,
            DataTypeConfig::Binary => DataType::Binary,
        }
    }
}

/// Everything the loader produces for one document.
pub struct LoadedConfig {
    /// The descriptor catalog
    pub registry: SchemaRegistry,
    /// One resource mapper per declared resource
    pub mappers: Vec<Arc<ResourceMapper>>,
}

/// Parse and build a configuration document with the default registries.
pub fn load(document: &str) -> ConfigResult<LoadedConfig> {
    load_with(
        document,
        &TransformationRegistry::with_defaults(),
        &DerivationRegistry::with_defaults(),
    )
}

/// Parse and build a configuration document against caller-supplied
/// registries.
pub fn load_with(
    document: &str,
    transforms: &TransformationRegistry,
    derivations: &DerivationRegistry,
) -> ConfigResult<LoadedConfig> {
    let config: GatewayConfig = serde_json::from_str(document)?;
    let mut descriptors = Vec::new();
    let mut mappers = Vec::new();
    for resource in &config.resources {
        let built = build_resource(resource, transforms, derivations)?;
        descriptors.push(built.0);
        mappers.push(built.1);
    }
    Ok(LoadedConfig {
        registry: SchemaRegistry::new(descriptors),
        mappers,
    })
}

/// Build a ready-to-serve resource service from a document and a directory
/// client.
pub fn build_service(
    document: &str,
    client: Arc<dyn DirectoryClient>,
) -> ConfigResult<LdapResourceService> {
    let loaded = load(document)?;
    Ok(LdapResourceService::new(loaded.mappers, client))
}

/// The standard sub-attributes every plural element recognizes.
fn standard_plural_subs(
    schema: &str,
    value_type: DataType,
    case_exact: bool,
) -> Vec<Arc<AttributeDescriptor>> {
    vec![
        Arc::new(
            AttributeDescriptor::simple(schema, "value", value_type).case_exact(case_exact),
        ),
        Arc::new(AttributeDescriptor::simple(schema, "type", DataType::String)),
        Arc::new(AttributeDescriptor::simple(schema, "primary", DataType::Boolean)),
        Arc::new(AttributeDescriptor::simple(schema, "display", DataType::String)),
        Arc::new(AttributeDescriptor::simple(schema, "operation", DataType::String)),
    ]
}

fn sub_descriptor(schema: &str, sub: &SubAttributeConfig) -> Arc<AttributeDescriptor> {
    let mut descriptor =
        AttributeDescriptor::simple(schema, &sub.name, DataType::from(sub.data_type))
            .case_exact(sub.case_exact);
    descriptor.required = sub.required;
    descriptor.read_only = sub.read_only;
    descriptor.description = sub.description.clone();
    Arc::new(descriptor)
}

/// The standard `meta` sub-attributes, merged with any declared ones.
fn complete_meta_subs(
    schema: &str,
    declared: Vec<Arc<AttributeDescriptor>>,
) -> Vec<Arc<AttributeDescriptor>> {
    let mut subs = declared;
    let standard: [(&str, DataType); 3] = [
        ("created", DataType::DateTime),
        ("lastModified", DataType::DateTime),
        ("version", DataType::String),
    ];
    for (name, data_type) in standard {
        if subs.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
            continue;
        }
        subs.push(Arc::new(
            AttributeDescriptor::simple(schema, name, data_type).read_only(),
        ));
    }
    subs
}

struct AttributeBuild {
    descriptor: Arc<AttributeDescriptor>,
    mapper: Option<Arc<dyn AttributeMapper>>,
}

fn invalid_attribute(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidAttribute {
        attribute: name.to_string(),
        message: message.into(),
    }
}

fn lookup_transform(
    transforms: &TransformationRegistry,
    name: &str,
) -> ConfigResult<Arc<dyn crate::transform::Transformation>> {
    transforms
        .get(name)
        .ok_or_else(|| ConfigError::UnknownTransformation(name.to_string()))
}

fn build_attribute(
    core_schema: &str,
    attribute: &AttributeConfig,
    transforms: &TransformationRegistry,
) -> ConfigResult<AttributeBuild> {
    let schema = attribute.schema.as_deref().unwrap_or(core_schema);
    let shapes = [
        attribute.simple.is_some(),
        attribute.complex.is_some(),
        attribute.simple_plural.is_some(),
        attribute.complex_plural.is_some(),
    ];
    if shapes.iter().filter(|present| **present).count() != 1 {
        return Err(invalid_attribute(
            &attribute.name,
            "exactly one shape subrecord is required",
        ));
    }

    let mut descriptor;
    let mut mapper: Option<Arc<dyn AttributeMapper>> = None;

    if let Some(shape) = &attribute.simple {
        descriptor = AttributeDescriptor::simple(schema, &attribute.name, shape.data_type.into())
            .case_exact(shape.case_exact);
    } else if let Some(shape) = &attribute.complex {
        let declared: Vec<Arc<AttributeDescriptor>> = shape
            .sub_attributes
            .iter()
            .map(|sub| sub_descriptor(schema, sub))
            .collect();
        let subs = if attribute.name.eq_ignore_ascii_case("meta") {
            complete_meta_subs(schema, declared)
        } else {
            declared
        };
        descriptor = AttributeDescriptor::complex(schema, &attribute.name, subs);
    } else if let Some(shape) = &attribute.simple_plural {
        descriptor = AttributeDescriptor::complex(
            schema,
            &attribute.name,
            standard_plural_subs(schema, shape.data_type.into(), shape.case_exact),
        )
        .plural(shape.plural_types.clone());
    } else {
        let shape = attribute.complex_plural.as_ref().expect("one shape");
        let mut subs = standard_plural_subs(schema, DataType::String, false);
        for sub in &shape.sub_attributes {
            let built = sub_descriptor(schema, sub);
            match subs
                .iter()
                .position(|s| s.name.eq_ignore_ascii_case(&built.name))
            {
                Some(i) => subs[i] = built,
                None => subs.push(built),
            }
        }
        descriptor = AttributeDescriptor::complex(schema, &attribute.name, subs)
            .plural(shape.plural_types.clone());
    }

    descriptor.read_only = attribute.read_only;
    descriptor.required = attribute.required;
    descriptor.description = attribute.description.clone();
    descriptor
        .validate()
        .map_err(|message| invalid_attribute(&attribute.name, message))?;
    let descriptor = Arc::new(descriptor);

    if attribute.derivation.is_some() {
        let has_mapping = attribute.simple.as_ref().is_some_and(|s| s.mapping.is_some())
            || attribute.complex.as_ref().is_some_and(|s| !s.mappings.is_empty())
            || attribute
                .simple_plural
                .as_ref()
                .is_some_and(|s| s.mapping.is_some())
            || attribute
                .complex_plural
                .as_ref()
                .is_some_and(|s| !s.mappings.is_empty());
        if has_mapping {
            return Err(invalid_attribute(
                &attribute.name,
                "a derived attribute cannot also carry mappings",
            ));
        }
        return Ok(AttributeBuild {
            descriptor,
            mapper: None,
        });
    }

    if let Some(shape) = &attribute.simple {
        if let Some(mapping) = &shape.mapping {
            mapper = Some(Arc::new(SimpleMapper::new(
                descriptor.clone(),
                &mapping.ldap_attribute,
                lookup_transform(transforms, &mapping.transform)?,
            )));
        }
    } else if let Some(shape) = &attribute.complex {
        if !shape.mappings.is_empty() {
            let mut bindings = Vec::with_capacity(shape.mappings.len());
            for mapping in &shape.mappings {
                let sub = descriptor.sub_attribute(&mapping.sub_attribute).ok_or_else(|| {
                    invalid_attribute(
                        &attribute.name,
                        format!("mapping references undeclared sub-attribute '{}'", mapping.sub_attribute),
                    )
                })?;
                bindings.push(SubAttributeBinding {
                    descriptor: sub.clone(),
                    ldap_attribute: mapping.ldap_attribute.clone(),
                    transform: lookup_transform(transforms, &mapping.transform)?,
                });
            }
            mapper = Some(Arc::new(ComplexMapper::new(descriptor.clone(), bindings)));
        }
    } else if let Some(shape) = &attribute.simple_plural {
        if let Some(mapping) = &shape.mapping {
            mapper = Some(Arc::new(PluralMapper::new(
                descriptor.clone(),
                PluralBacking::MultiValued {
                    ldap_attribute: mapping.ldap_attribute.clone(),
                    transform: lookup_transform(transforms, &mapping.transform)?,
                },
            )));
        }
    } else if let Some(shape) = &attribute.complex_plural {
        if !shape.mappings.is_empty() {
            let mut variants = Vec::with_capacity(shape.mappings.len());
            for mapping in &shape.mappings {
                if !shape
                    .plural_types
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&mapping.plural_type))
                {
                    return Err(invalid_attribute(
                        &attribute.name,
                        format!("mapping references unrecognized type '{}'", mapping.plural_type),
                    ));
                }
                variants.push(CanonicalVariant {
                    type_tag: mapping.plural_type.clone(),
                    ldap_attribute: mapping.ldap_attribute.clone(),
                    transform: lookup_transform(transforms, &mapping.transform)?,
                });
            }
            mapper = Some(Arc::new(PluralMapper::new(
                descriptor.clone(),
                PluralBacking::Canonical(variants),
            )));
        }
    }

    Ok(AttributeBuild { descriptor, mapper })
}

fn build_resource(
    resource: &ResourceConfig,
    transforms: &TransformationRegistry,
    derivations: &DerivationRegistry,
) -> ConfigResult<(ResourceDescriptor, Arc<ResourceMapper>)> {
    let invalid = |message: String| ConfigError::InvalidResource {
        resource: resource.name.clone(),
        message,
    };

    let mut attributes: Vec<Arc<AttributeDescriptor>> = vec![Arc::new(
        AttributeDescriptor::simple(&resource.schema, "id", DataType::String).read_only(),
    )];
    let mut mappers: Vec<Arc<dyn AttributeMapper>> = Vec::new();
    let mut derived: Vec<Arc<dyn DerivedAttribute>> = Vec::new();

    for attribute in &resource.attributes {
        let built = build_attribute(&resource.schema, attribute, transforms)?;
        if let Some(derivation) = &attribute.derivation {
            let derivation = derivations
                .create(&derivation.name, built.descriptor.clone())
                .ok_or_else(|| ConfigError::UnknownDerivation(derivation.name.clone()))?;
            derived.push(derivation);
        }
        if let Some(mapper) = built.mapper {
            mappers.push(mapper);
        }
        attributes.push(built.descriptor);
    }

    let search_filter = LdapFilter::parse(&resource.ldap_search.filter)
        .map_err(|e| invalid(format!("bad search filter: {e}")))?;
    let dn_template = DnTemplate::parse(&resource.ldap_add.dn_template)
        .map_err(|e| invalid(format!("bad DN template: {e}")))?;
    let mut fixed_attributes = Vec::with_capacity(resource.ldap_add.fixed_attributes.len());
    for fixed in &resource.ldap_add.fixed_attributes {
        let on_conflict = match &fixed.on_conflict {
            Some(policy) => ConflictPolicy::parse(policy)
                .ok_or_else(|| invalid(format!("unknown conflict policy '{policy}'")))?,
            None => ConflictPolicy::Preserve,
        };
        fixed_attributes.push(FixedAttribute {
            ldap_attribute: fixed.ldap_attribute.clone(),
            values: fixed.fixed_values.clone(),
            on_conflict,
        });
    }

    let descriptor = ResourceDescriptor {
        name: resource.name.clone(),
        endpoint: resource.endpoint.clone(),
        schema: resource.schema.clone(),
        attributes,
    };
    let mapper = ResourceMapper::new(
        Arc::new(descriptor.clone()),
        SearchParameters {
            base_dn: resource.ldap_search.base_dn.clone(),
            scope: resource.ldap_search.scope.into(),
            filter: search_filter,
            id_attribute: resource.ldap_search.id_attribute.clone(),
            max_results: resource.ldap_search.max_results,
        },
        AddParameters {
            dn_template,
            fixed_attributes,
        },
        mappers,
        derived,
    );
    Ok((descriptor, Arc::new(mapper)))
}

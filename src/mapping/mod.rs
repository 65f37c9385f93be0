//! Attribute mapping strategies between SCIM attributes and LDAP attribute
//! types.
//!
//! Three mapper shapes cover the configuration grammar: [`SimpleMapper`]
//! binds one simple SCIM attribute to one LDAP type, [`ComplexMapper`] binds
//! each sub-attribute separately, and [`PluralMapper`] handles typed plural
//! attributes backed by canonical LDAP types or a single multi-valued type.
//! DN construction and derived attributes live in [`dn`] and [`derived`].

pub mod complex;
pub mod derived;
pub mod dn;
pub mod plural;
pub mod simple;

use std::sync::Arc;

use crate::error::{ScimError, ScimResult};
use crate::filter::FilterOp;
use crate::ldap::filter::escape_value;
use crate::ldap::{Entry, Modification, ModificationType};
use crate::resource::{ScimAttribute, ScimObject};
use crate::schema::AttributeDescriptor;
use crate::transform::Transformation;

pub use complex::{ComplexMapper, SubAttributeBinding};
pub use derived::{
    DerivationRegistry, DerivedAttribute, GroupsDerivation, MembersDerivation, MetaDerivation,
};
pub use dn::{ConflictPolicy, DnTemplate, FixedAttribute};
pub use plural::{CanonicalVariant, PluralBacking, PluralMapper};
pub use simple::SimpleMapper;

/// One SCIM↔LDAP mapping strategy.
///
/// Mappers are immutable, configured once, and shared across requests. The
/// filter and sort methods receive the leaf pieces (operator, optional
/// sub-attribute, raw literal); `Ok(None)` from `to_ldap_filter` means the
/// leaf has no LDAP translation and the caller must post-filter in memory.
pub trait AttributeMapper: Send + Sync {
    /// The descriptor of the SCIM attribute this mapper serves.
    fn descriptor(&self) -> &Arc<AttributeDescriptor>;

    /// Every LDAP attribute type this mapper reads or writes.
    fn ldap_attribute_types(&self) -> Vec<String>;

    /// Write the mapped LDAP attribute values for `object` into `entry`.
    fn to_ldap(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()>;

    /// Read the mapped SCIM attribute out of `entry`, if present.
    fn to_scim(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>>;

    /// Translate a filter leaf on this attribute into an LDAP filter
    /// fragment.
    fn to_ldap_filter(
        &self,
        op: FilterOp,
        sub: Option<&str>,
        value: Option<&str>,
    ) -> ScimResult<Option<String>>;

    /// The LDAP attribute type a sort on this attribute path uses.
    fn ldap_sort_attribute(&self, sub: Option<&str>) -> Option<String>;
}

/// Build the LDAP filter fragment for one simple binding.
///
/// SCIM has strict `gt`/`lt` but LDAP only offers `>=`/`<=`, so those widen
/// and the query pipeline re-filters in memory.
pub(crate) fn simple_filter_fragment(
    attribute: &str,
    transform: &dyn Transformation,
    op: FilterOp,
    value: Option<&str>,
) -> ScimResult<String> {
    if op == FilterOp::Pr {
        return Ok(format!("({attribute}=*)"));
    }
    let literal = value.ok_or_else(|| {
        ScimError::invalid_filter(format!("operator '{}' requires a value", op.as_str()))
    })?;
    let assertion = escape_value(&transform.to_ldap_filter_value(literal)?);
    Ok(match op {
        FilterOp::Eq => format!("({attribute}={assertion})"),
        FilterOp::Co => format!("({attribute}=*{assertion}*)"),
        FilterOp::Sw => format!("({attribute}={assertion}*)"),
        FilterOp::Gt | FilterOp::Ge => format!("({attribute}>={assertion})"),
        FilterOp::Lt | FilterOp::Le => format!("({attribute}<={assertion})"),
        FilterOp::Pr => unreachable!("handled above"),
    })
}

/// Diff a current entry against the target attribute state and emit the
/// minimal modification list, restricted to the given attribute types.
///
/// Attribute types outside the list are untouched, which is what keeps
/// unmapped directory attributes intact across SCIM replace operations.
pub fn diff_modifications(
    current: &Entry,
    target: &Entry,
    attribute_types: &[String],
) -> Vec<Modification> {
    let mut modifications = Vec::new();
    for attribute in attribute_types {
        let current_values = current.values(attribute);
        let target_values = target.values(attribute);
        if target_values.is_empty() {
            if !current_values.is_empty() {
                modifications.push(Modification::new(
                    ModificationType::Delete,
                    attribute.clone(),
                    Vec::new(),
                ));
            }
        } else if current_values.is_empty() {
            modifications.push(Modification::new(
                ModificationType::Add,
                attribute.clone(),
                target_values.to_vec(),
            ));
        } else if !same_value_set(current_values, target_values) {
            modifications.push(Modification::new(
                ModificationType::Replace,
                attribute.clone(),
                target_values.to_vec(),
            ));
        }
    }
    modifications
}

fn same_value_set(left: &[Vec<u8>], right: &[Vec<u8>]) -> bool {
    left.len() == right.len() && left.iter().all(|v| right.contains(v))
}

//! In-memory filter evaluation against a [`ScimObject`].

use crate::resource::{AttributeValue, ScimObject, SimpleValue};
use crate::schema::{AttributeDescriptor, DataType, ResourceDescriptor};

use super::{AttributePath, Filter, FilterOp};

pub(crate) fn matches(filter: &Filter, object: &ScimObject, resource: &ResourceDescriptor) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| matches(c, object, resource)),
        Filter::Or(children) => children.iter().any(|c| matches(c, object, resource)),
        Filter::Compare { path, op, value } => {
            leaf_matches(object, resource, path, *op, value.as_deref())
        }
    }
}

/// Evaluate one comparison. A plural attribute matches if any element does.
fn leaf_matches(
    object: &ScimObject,
    resource: &ResourceDescriptor,
    path: &AttributePath,
    op: FilterOp,
    literal: Option<&str>,
) -> bool {
    let schema = path.schema.as_deref().unwrap_or(&resource.schema);
    let Some(attribute) = object.get(schema, &path.name) else {
        return false;
    };

    // Collect the comparable simple values the path points at. A sub-less
    // path on complex values falls back to the conventional `value`
    // sub-attribute, so `emails co "x"` behaves like `emails.value co "x"`.
    let mut candidates: Vec<(&AttributeDescriptor, &SimpleValue)> = Vec::new();
    for value in attribute.values() {
        match value {
            AttributeValue::Simple(simple) => {
                if path.sub.is_none() {
                    candidates.push((attribute.descriptor().as_ref(), simple));
                }
            }
            AttributeValue::Complex(complex) => {
                let sub_name = path.sub.as_deref().unwrap_or("value");
                if let Some(sub) = complex.get(sub_name) {
                    if let Some(simple) = sub.simple_value() {
                        candidates.push((sub.descriptor().as_ref(), simple));
                    }
                }
            }
        }
    }

    match op {
        FilterOp::Pr => {
            if path.sub.is_none() {
                !attribute.values().is_empty()
            } else {
                !candidates.is_empty()
            }
        }
        _ => {
            let Some(literal) = literal else {
                return false;
            };
            candidates
                .iter()
                .any(|(descriptor, value)| compare(descriptor, value, op, literal))
        }
    }
}

fn fold(descriptor: &AttributeDescriptor, text: &str) -> String {
    if descriptor.case_exact {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

fn compare(
    descriptor: &AttributeDescriptor,
    value: &SimpleValue,
    op: FilterOp,
    literal: &str,
) -> bool {
    match op {
        FilterOp::Eq => match value {
            SimpleValue::String(s) => fold(descriptor, s) == fold(descriptor, literal),
            _ => SimpleValue::parse(value.data_type(), literal)
                .is_ok_and(|typed| typed == *value),
        },
        FilterOp::Co => {
            fold(descriptor, &value.to_wire_string()).contains(&fold(descriptor, literal))
        }
        FilterOp::Sw => {
            fold(descriptor, &value.to_wire_string()).starts_with(&fold(descriptor, literal))
        }
        FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le => {
            ordered_compare(descriptor, value, op, literal)
        }
        FilterOp::Pr => true,
    }
}

/// Ordering comparisons: chronological for datetimes, numeric for integers,
/// lexicographic under the case rule for strings. Undefined for booleans and
/// binary values, which never match.
fn ordered_compare(
    descriptor: &AttributeDescriptor,
    value: &SimpleValue,
    op: FilterOp,
    literal: &str,
) -> bool {
    let ordering = match value {
        SimpleValue::DateTime(actual) => {
            match SimpleValue::parse(DataType::DateTime, literal) {
                Ok(SimpleValue::DateTime(wanted)) => actual.cmp(&wanted),
                _ => return false,
            }
        }
        SimpleValue::Integer(actual) => match literal.parse::<i64>() {
            Ok(wanted) => actual.cmp(&wanted),
            Err(_) => return false,
        },
        SimpleValue::String(actual) => fold(descriptor, actual).cmp(&fold(descriptor, literal)),
        SimpleValue::Boolean(_) | SimpleValue::Binary(_) => return false,
    };
    match op {
        FilterOp::Gt => ordering.is_gt(),
        FilterOp::Ge => ordering.is_ge(),
        FilterOp::Lt => ordering.is_lt(),
        FilterOp::Le => ordering.is_le(),
        _ => false,
    }
}

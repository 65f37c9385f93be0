//! JSON wire form.
//!
//! A resource serializes to an object with a `schemas` array, one key per
//! core-schema top-level attribute, and one nested object per extension
//! schema keyed by its URN. Parsing is descriptor-driven: unknown keys are
//! ignored, simple values inherit their type from the descriptor.

use serde_json::{Map, Value, json};

use crate::error::{ScimError, ScimResult};
use crate::resource::{
    AttributeValue, ComplexValue, ListResponse, ScimAttribute, ScimObject, SimpleValue,
};
use crate::schema::{AttributeDescriptor, DataType, ResourceDescriptor};

/// Serialize a resource to its JSON wire form.
pub fn marshal_object(resource: &ResourceDescriptor, object: &ScimObject) -> Value {
    let mut root = Map::new();

    let mut schemas = vec![resource.schema.clone()];
    for urn in object.schemas() {
        if !urn.eq_ignore_ascii_case(&resource.schema) {
            schemas.push(urn);
        }
    }
    root.insert("schemas".to_string(), json!(schemas));

    for attribute in object.attributes_for_schema(&resource.schema) {
        root.insert(
            attribute.descriptor().name.clone(),
            attribute_to_json(attribute),
        );
    }
    for urn in object.schemas() {
        if urn.eq_ignore_ascii_case(&resource.schema) {
            continue;
        }
        let mut extension = Map::new();
        for attribute in object.attributes_for_schema(&urn) {
            extension.insert(
                attribute.descriptor().name.clone(),
                attribute_to_json(attribute),
            );
        }
        root.insert(urn, Value::Object(extension));
    }
    Value::Object(root)
}

fn simple_to_json(value: &SimpleValue) -> Value {
    match value {
        SimpleValue::Boolean(b) => Value::Bool(*b),
        SimpleValue::Integer(i) => json!(i),
        other => Value::String(other.to_wire_string()),
    }
}

fn complex_to_json(complex: &ComplexValue) -> Value {
    let mut map = Map::new();
    for sub in complex.iter() {
        if let Some(value) = sub.simple_value() {
            map.insert(sub.descriptor().name.clone(), simple_to_json(value));
        }
    }
    Value::Object(map)
}

fn attribute_to_json(attribute: &ScimAttribute) -> Value {
    if attribute.is_plural() {
        let elements: Vec<Value> = attribute
            .values()
            .iter()
            .map(|element| match element {
                AttributeValue::Simple(value) => simple_to_json(value),
                AttributeValue::Complex(complex) => complex_to_json(complex),
            })
            .collect();
        return Value::Array(elements);
    }
    match attribute.singular_value() {
        Some(AttributeValue::Simple(value)) => simple_to_json(value),
        Some(AttributeValue::Complex(complex)) => complex_to_json(complex),
        None => Value::Null,
    }
}

/// Parse a resource from its JSON wire form.
pub fn unmarshal_object(resource: &ResourceDescriptor, value: &Value) -> ScimResult<ScimObject> {
    let Value::Object(map) = value else {
        return Err(ScimError::invalid_resource(
            "resource payload must be a JSON object".to_string(),
        ));
    };
    let mut object = ScimObject::new();
    for (key, entry) in map {
        if key == "schemas" {
            continue;
        }
        if key.contains(':') {
            // Extension schemas nest their attributes under the URN key.
            let Value::Object(extension) = entry else {
                return Err(ScimError::invalid_resource(format!(
                    "extension '{key}' must be a JSON object"
                )));
            };
            for (name, sub_value) in extension {
                if let Some(descriptor) = resource.attribute(key, name) {
                    object.add(parse_attribute(descriptor, sub_value)?);
                }
            }
            continue;
        }
        if let Some(descriptor) = resource.attribute(&resource.schema, key) {
            object.add(parse_attribute(descriptor, entry)?);
        }
    }
    Ok(object)
}

fn json_to_simple(descriptor: &AttributeDescriptor, value: &Value) -> ScimResult<SimpleValue> {
    match (descriptor.data_type, value) {
        (DataType::Boolean, Value::Bool(b)) => Ok(SimpleValue::Boolean(*b)),
        (DataType::Integer, Value::Number(n)) => n.as_i64().map(SimpleValue::Integer).ok_or_else(
            || ScimError::invalid_value(format!("'{n}' is not an integer")),
        ),
        (_, Value::String(s)) => SimpleValue::parse(descriptor.data_type, s),
        (expected, other) => Err(ScimError::invalid_value(format!(
            "attribute '{}' expects a {} value, got {other}",
            descriptor.name,
            expected.as_str()
        ))),
    }
}

fn parse_complex_value(
    descriptor: &std::sync::Arc<AttributeDescriptor>,
    map: &Map<String, Value>,
) -> ScimResult<ComplexValue> {
    let mut complex = ComplexValue::new();
    for (name, sub_value) in map {
        let Some(sub_descriptor) = descriptor.sub_attribute(name) else {
            continue;
        };
        complex.insert(ScimAttribute::simple(
            sub_descriptor.clone(),
            json_to_simple(sub_descriptor, sub_value)?,
        ));
    }
    Ok(complex)
}

fn parse_attribute(
    descriptor: &std::sync::Arc<AttributeDescriptor>,
    value: &Value,
) -> ScimResult<ScimAttribute> {
    if descriptor.multi_valued {
        let Value::Array(items) = value else {
            return Err(ScimError::invalid_value(format!(
                "attribute '{}' must be a JSON array",
                descriptor.name
            )));
        };
        let mut elements = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Object(map) => {
                    elements.push(AttributeValue::Complex(parse_complex_value(
                        descriptor, map,
                    )?));
                }
                // A bare value is shorthand for an element with only
                // `value` set.
                other => {
                    let value_descriptor = descriptor.sub_attribute("value").ok_or_else(|| {
                        ScimError::invalid_value(format!(
                            "attribute '{}' does not accept bare values",
                            descriptor.name
                        ))
                    })?;
                    let mut complex = ComplexValue::new();
                    complex.insert(ScimAttribute::simple(
                        value_descriptor.clone(),
                        json_to_simple(value_descriptor, other)?,
                    ));
                    elements.push(AttributeValue::Complex(complex));
                }
            }
        }
        return Ok(ScimAttribute::plural(descriptor.clone(), elements));
    }
    if descriptor.data_type == DataType::Complex {
        let Value::Object(map) = value else {
            return Err(ScimError::invalid_value(format!(
                "attribute '{}' must be a JSON object",
                descriptor.name
            )));
        };
        return Ok(ScimAttribute::singular(
            descriptor.clone(),
            AttributeValue::Complex(parse_complex_value(descriptor, map)?),
        ));
    }
    Ok(ScimAttribute::simple(
        descriptor.clone(),
        json_to_simple(descriptor, value)?,
    ))
}

/// Serialize a query result with its list envelope.
pub fn marshal_list(resource: &ResourceDescriptor, list: &ListResponse) -> Value {
    let resources: Vec<Value> = list
        .resources
        .iter()
        .map(|object| marshal_object(resource, object))
        .collect();
    json!({
        "totalResults": list.total_results,
        "startIndex": list.start_index,
        "Resources": resources,
    })
}

/// Parse a query result envelope, applying the documented defaults.
pub fn unmarshal_list(resource: &ResourceDescriptor, value: &Value) -> ScimResult<ListResponse> {
    let Value::Object(map) = value else {
        return Err(ScimError::invalid_resource(
            "list payload must be a JSON object".to_string(),
        ));
    };
    let mut resources = Vec::new();
    if let Some(items) = map.get("Resources") {
        let Value::Array(items) = items else {
            return Err(ScimError::invalid_resource(
                "'Resources' must be a JSON array".to_string(),
            ));
        };
        for item in items {
            resources.push(unmarshal_object(resource, item)?);
        }
    }
    let total_results = map
        .get("totalResults")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(resources.len());
    let start_index = map
        .get("startIndex")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(1);
    Ok(ListResponse {
        resources,
        total_results,
        start_index,
    })
}

/// Serialize an error to the JSON error form.
pub fn marshal_error(error: &ScimError) -> Value {
    json!({
        "Errors": [{
            "code": error.status(),
            "description": error.description(),
        }]
    })
}

/// Parse the JSON error form back into an error value.
pub fn unmarshal_error(value: &Value) -> ScimResult<ScimError> {
    let first = value
        .get("Errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .ok_or_else(|| {
            ScimError::invalid_resource("error payload carries no 'Errors' entry".to_string())
        })?;
    let code = match first.get("code") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(500) as u16,
        Some(Value::String(s)) => s.parse().map_err(|_| {
            ScimError::invalid_resource(format!("'{s}' is not a status code"))
        })?,
        _ => 500,
    };
    let description = first
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(ScimError::from_status(code, description))
}

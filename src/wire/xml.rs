//! XML wire form.
//!
//! The root element's local name is the resource name and its namespace the
//! core schema URN; extension attributes ride under their own namespace with
//! a generated prefix. Plural attributes emit a wrapper element holding one
//! child per element. Parsing resolves attributes by `(namespace URI or core
//! schema, local name)` against the resource descriptor and ignores unknown
//! elements.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;

use crate::error::{ScimError, ScimResult};
use crate::resource::{
    AttributeValue, ComplexValue, ListResponse, ScimAttribute, ScimObject, SimpleValue,
};
use crate::schema::{AttributeDescriptor, DataType, ResourceDescriptor};

use super::PLURAL_SUB_ORDER;

/// A parsed element: local name, resolved namespace, text, children.
#[derive(Debug, Clone, Default)]
struct XmlNode {
    namespace: Option<String>,
    name: String,
    text: String,
    children: Vec<XmlNode>,
}

fn invalid(message: impl Into<String>) -> ScimError {
    ScimError::invalid_resource(message.into())
}

fn node_from(resolve: ResolveResult<'_>, start: &BytesStart<'_>) -> XmlNode {
    let namespace = match resolve {
        ResolveResult::Bound(ns) => {
            Some(String::from_utf8_lossy(ns.into_inner()).into_owned())
        }
        _ => None,
    };
    XmlNode {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        text: String::new(),
        children: Vec::new(),
    }
}

fn attach(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) -> ScimResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_some() {
                return Err(invalid("multiple root elements"));
            }
            *root = Some(node);
        }
    }
    Ok(())
}

fn parse_document(input: &str) -> ScimResult<XmlNode> {
    let mut reader = NsReader::from_str(input);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;
    loop {
        let (resolve, event) = reader
            .read_resolved_event()
            .map_err(|e| invalid(format!("malformed XML: {e}")))?;
        match event {
            Event::Start(start) => stack.push(node_from(resolve, &start)),
            Event::Empty(start) => {
                let node = node_from(resolve, &start);
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| invalid("unbalanced end tag"))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let decoded = text
                        .unescape()
                        .map_err(|e| invalid(format!("malformed XML text: {e}")))?;
                    top.text.push_str(&decoded);
                }
            }
            Event::CData(cdata) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(invalid("truncated document"));
    }
    root.ok_or_else(|| invalid("empty document"))
}

fn parse_simple(descriptor: &AttributeDescriptor, text: &str) -> ScimResult<SimpleValue> {
    SimpleValue::parse(descriptor.data_type, text.trim())
}

fn complex_from_children(
    descriptor: &std::sync::Arc<AttributeDescriptor>,
    children: &[XmlNode],
) -> ScimResult<ComplexValue> {
    let mut complex = ComplexValue::new();
    for child in children {
        let Some(sub_descriptor) = descriptor.sub_attribute(&child.name) else {
            continue;
        };
        complex.insert(ScimAttribute::simple(
            sub_descriptor.clone(),
            parse_simple(sub_descriptor, &child.text)?,
        ));
    }
    Ok(complex)
}

fn attribute_from_node(
    descriptor: &std::sync::Arc<AttributeDescriptor>,
    node: &XmlNode,
) -> ScimResult<ScimAttribute> {
    if descriptor.multi_valued {
        let mut elements = Vec::with_capacity(node.children.len());
        for element in &node.children {
            if element.children.is_empty() && !element.text.trim().is_empty() {
                // Text-only element: shorthand for `value`.
                let value_descriptor = descriptor.sub_attribute("value").ok_or_else(|| {
                    ScimError::invalid_value(format!(
                        "attribute '{}' does not accept bare values",
                        descriptor.name
                    ))
                })?;
                let mut complex = ComplexValue::new();
                complex.insert(ScimAttribute::simple(
                    value_descriptor.clone(),
                    parse_simple(value_descriptor, &element.text)?,
                ));
                elements.push(AttributeValue::Complex(complex));
            } else {
                elements.push(AttributeValue::Complex(complex_from_children(
                    descriptor,
                    &element.children,
                )?));
            }
        }
        return Ok(ScimAttribute::plural(descriptor.clone(), elements));
    }
    if descriptor.data_type == DataType::Complex {
        return Ok(ScimAttribute::singular(
            descriptor.clone(),
            AttributeValue::Complex(complex_from_children(descriptor, &node.children)?),
        ));
    }
    Ok(ScimAttribute::simple(
        descriptor.clone(),
        parse_simple(descriptor, &node.text)?,
    ))
}

fn object_from_node(resource: &ResourceDescriptor, node: &XmlNode) -> ScimResult<ScimObject> {
    let mut object = ScimObject::new();
    for child in &node.children {
        let schema = child.namespace.as_deref().unwrap_or(&resource.schema);
        let Some(descriptor) = resource.attribute(schema, &child.name) else {
            continue;
        };
        object.add(attribute_from_node(descriptor, child)?);
    }
    Ok(object)
}

/// Parse a resource from its XML wire form.
pub fn unmarshal_object(resource: &ResourceDescriptor, input: &str) -> ScimResult<ScimObject> {
    let root = parse_document(input)?;
    if !root.name.eq_ignore_ascii_case(&resource.name) {
        return Err(invalid(format!(
            "expected root element '{}', found '{}'",
            resource.name, root.name
        )));
    }
    object_from_node(resource, &root)
}

type XmlWriter = Writer<Vec<u8>>;

fn write_event(writer: &mut XmlWriter, event: Event<'_>) -> ScimResult<()> {
    writer
        .write_event(event)
        .map_err(|e| ScimError::internal(format!("XML serialization failed: {e}")))
}

fn write_text_element(writer: &mut XmlWriter, name: &str, text: &str) -> ScimResult<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn qualified(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{name}"),
        None => name.to_string(),
    }
}

/// The element name for one element of a plural attribute: the singular
/// form of the wrapper name.
fn element_name(plural_name: &str) -> String {
    match plural_name.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => plural_name.to_string(),
    }
}

/// Write the sub-attributes of one complex value, well-known plural
/// sub-attributes first in their fixed order, the rest in descriptor order.
fn write_complex(
    writer: &mut XmlWriter,
    descriptor: &AttributeDescriptor,
    complex: &ComplexValue,
    prefix: Option<&str>,
) -> ScimResult<()> {
    let mut written: Vec<String> = Vec::new();
    for name in PLURAL_SUB_ORDER {
        if let Some(sub) = complex.get(name) {
            if let Some(value) = sub.simple_value() {
                write_text_element(
                    writer,
                    &qualified(prefix, &sub.descriptor().name),
                    &value.to_wire_string(),
                )?;
                written.push(name.to_string());
            }
        }
    }
    for sub_descriptor in &descriptor.sub_attributes {
        if written
            .iter()
            .any(|w| w.eq_ignore_ascii_case(&sub_descriptor.name))
        {
            continue;
        }
        if let Some(value) = complex.simple_value(&sub_descriptor.name) {
            write_text_element(
                writer,
                &qualified(prefix, &sub_descriptor.name),
                &value.to_wire_string(),
            )?;
        }
    }
    Ok(())
}

fn write_attribute(
    writer: &mut XmlWriter,
    attribute: &ScimAttribute,
    prefix: Option<&str>,
) -> ScimResult<()> {
    let descriptor = attribute.descriptor();
    let name = qualified(prefix, &descriptor.name);
    if attribute.is_plural() {
        write_event(writer, Event::Start(BytesStart::new(name.as_str())))?;
        let child = qualified(prefix, &element_name(&descriptor.name));
        for element in attribute.values() {
            write_event(writer, Event::Start(BytesStart::new(child.as_str())))?;
            match element {
                AttributeValue::Complex(complex) => {
                    write_complex(writer, descriptor, complex, prefix)?;
                }
                AttributeValue::Simple(value) => {
                    write_event(writer, Event::Text(BytesText::new(&value.to_wire_string())))?;
                }
            }
            write_event(writer, Event::End(BytesEnd::new(child.as_str())))?;
        }
        return write_event(writer, Event::End(BytesEnd::new(name.as_str())));
    }
    match attribute.singular_value() {
        Some(AttributeValue::Complex(complex)) => {
            write_event(writer, Event::Start(BytesStart::new(name.as_str())))?;
            write_complex(writer, descriptor, complex, prefix)?;
            write_event(writer, Event::End(BytesEnd::new(name.as_str())))
        }
        Some(AttributeValue::Simple(value)) => {
            write_text_element(writer, &name, &value.to_wire_string())
        }
        None => Ok(()),
    }
}

fn write_object(
    writer: &mut XmlWriter,
    resource: &ResourceDescriptor,
    object: &ScimObject,
) -> ScimResult<()> {
    let extensions: Vec<String> = object
        .schemas()
        .into_iter()
        .filter(|urn| !urn.eq_ignore_ascii_case(&resource.schema))
        .collect();
    let mut root = BytesStart::new(resource.name.as_str());
    root.push_attribute(("xmlns", resource.schema.as_str()));
    for (i, urn) in extensions.iter().enumerate() {
        let key = format!("xmlns:ns{}", i + 1);
        root.push_attribute((key.as_str(), urn.as_str()));
    }
    write_event(writer, Event::Start(root))?;
    for descriptor in &resource.attributes {
        if !descriptor.schema.eq_ignore_ascii_case(&resource.schema) {
            continue;
        }
        if let Some(attribute) = object.get(&descriptor.schema, &descriptor.name) {
            write_attribute(writer, attribute, None)?;
        }
    }
    for (i, urn) in extensions.iter().enumerate() {
        let prefix = format!("ns{}", i + 1);
        for descriptor in &resource.attributes {
            if !descriptor.schema.eq_ignore_ascii_case(urn) {
                continue;
            }
            if let Some(attribute) = object.get(&descriptor.schema, &descriptor.name) {
                write_attribute(writer, attribute, Some(&prefix))?;
            }
        }
    }
    write_event(writer, Event::End(BytesEnd::new(resource.name.as_str())))
}

fn into_string(writer: XmlWriter) -> ScimResult<String> {
    String::from_utf8(writer.into_inner())
        .map_err(|_| ScimError::internal("serialized XML is not UTF-8".to_string()))
}

/// Serialize a resource to its XML wire form.
pub fn marshal_object(resource: &ResourceDescriptor, object: &ScimObject) -> ScimResult<String> {
    let mut writer = Writer::new(Vec::new());
    write_object(&mut writer, resource, object)?;
    into_string(writer)
}

/// Serialize a query result with its list envelope.
pub fn marshal_list(resource: &ResourceDescriptor, list: &ListResponse) -> ScimResult<String> {
    let mut writer = Writer::new(Vec::new());
    let mut root = BytesStart::new("Response");
    root.push_attribute(("xmlns", resource.schema.as_str()));
    write_event(&mut writer, Event::Start(root))?;
    write_text_element(&mut writer, "totalResults", &list.total_results.to_string())?;
    write_text_element(&mut writer, "startIndex", &list.start_index.to_string())?;
    write_event(&mut writer, Event::Start(BytesStart::new("Resources")))?;
    for object in &list.resources {
        write_object(&mut writer, resource, object)?;
    }
    write_event(&mut writer, Event::End(BytesEnd::new("Resources")))?;
    write_event(&mut writer, Event::End(BytesEnd::new("Response")))?;
    into_string(writer)
}

/// Parse a query result envelope, applying the documented defaults.
pub fn unmarshal_list(resource: &ResourceDescriptor, input: &str) -> ScimResult<ListResponse> {
    let root = parse_document(input)?;
    let mut resources = Vec::new();
    for child in &root.children {
        if child.name.eq_ignore_ascii_case("Resources") {
            for item in &child.children {
                resources.push(object_from_node(resource, item)?);
            }
        }
    }
    let find_number = |name: &str| -> Option<usize> {
        root.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|c| c.text.trim().parse().ok())
    };
    let total_results = find_number("totalResults").unwrap_or(resources.len());
    let start_index = find_number("startIndex").unwrap_or(1);
    Ok(ListResponse {
        resources,
        total_results,
        start_index,
    })
}

/// Serialize an error to the `<Error>` wire form.
pub fn marshal_error(error: &ScimError) -> ScimResult<String> {
    let mut writer = Writer::new(Vec::new());
    write_event(&mut writer, Event::Start(BytesStart::new("Error")))?;
    write_text_element(&mut writer, "code", &error.status().to_string())?;
    write_text_element(&mut writer, "description", error.description())?;
    write_event(&mut writer, Event::End(BytesEnd::new("Error")))?;
    into_string(writer)
}

/// Parse the `<Error>` wire form back into an error value.
pub fn unmarshal_error(input: &str) -> ScimResult<ScimError> {
    let root = parse_document(input)?;
    if !root.name.eq_ignore_ascii_case("Error") {
        return Err(invalid(format!(
            "expected 'Error' element, found '{}'",
            root.name
        )));
    }
    let child_text = |name: &str| -> Option<String> {
        root.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.text.trim().to_string())
    };
    let code: u16 = child_text("code")
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| invalid("error element carries no numeric code"))?;
    let description = child_text("description").unwrap_or_default();
    Ok(ScimError::from_status(code, description))
}

//! DN templates and fixed attributes for entry creation.

use crate::error::{ScimError, ScimResult};
use crate::ldap::Entry;

/// Escape one RDN attribute value per RFC 4514.
fn escape_rdn_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in chars.iter().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && matches!(c, ' ' | '#'))
            || (i == chars.len() - 1 && *c == ' ');
        if special {
            escaped.push('\\');
        }
        escaped.push(*c);
    }
    escaped
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Attribute(String),
}

/// A DN template: literal text interleaved with `{attr}` placeholders that
/// expand to the first staged value of the named LDAP attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct DnTemplate {
    template: String,
    segments: Vec<Segment>,
}

impl DnTemplate {
    /// Parse a template string such as
    /// `uid={uid},ou=People,dc=example,dc=com`.
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            if c == '{' {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(format!("unterminated placeholder in '{template}'")),
                    }
                }
                if name.is_empty() {
                    return Err(format!("empty placeholder in '{template}'"));
                }
                segments.push(Segment::Attribute(name));
            } else if c == '}' {
                return Err(format!("stray '}}' in '{template}'"));
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if !segments.iter().any(|s| matches!(s, Segment::Attribute(_))) {
            return Err(format!("template '{template}' references no attribute"));
        }
        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The LDAP attribute types the placeholders reference.
    pub fn attribute_types(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Attribute(name) => Some(name.clone()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Expand the template against a staged entry.
    ///
    /// Every placeholder must be bound by a staged value; an unbound
    /// placeholder is an `InvalidResource` error.
    pub fn construct(&self, entry: &Entry) -> ScimResult<String> {
        let mut dn = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => dn.push_str(text),
                Segment::Attribute(name) => match entry.first_value_str(name) {
                    Some(value) => dn.push_str(&escape_rdn_value(&value)),
                    None => {
                        return Err(ScimError::invalid_resource(format!(
                            "DN template '{}' references unbound attribute '{name}'",
                            self.template
                        )));
                    }
                },
            }
        }
        Ok(dn)
    }
}

/// What to do when a fixed attribute collides with mapper output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Append the fixed values to whatever the mappers produced
    Merge,
    /// Discard mapper values in favor of the fixed ones
    Overwrite,
    /// Keep mapper values if any exist, else use the fixed ones
    Preserve,
}

impl ConflictPolicy {
    /// Parse the configuration spelling (`MERGE`/`OVERWRITE`/`PRESERVE`).
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "MERGE" => Some(Self::Merge),
            "OVERWRITE" => Some(Self::Overwrite),
            "PRESERVE" => Some(Self::Preserve),
            _ => None,
        }
    }
}

/// An attribute stamped onto every created entry with fixed values.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedAttribute {
    /// LDAP attribute type to stamp
    pub ldap_attribute: String,
    /// The fixed values
    pub values: Vec<String>,
    /// Collision handling against mapper-produced values
    pub on_conflict: ConflictPolicy,
}

impl FixedAttribute {
    /// Apply this fixed attribute to a staged entry.
    pub fn apply(&self, entry: &mut Entry) {
        let fixed: Vec<Vec<u8>> = self.values.iter().map(|v| v.as_bytes().to_vec()).collect();
        match self.on_conflict {
            ConflictPolicy::Overwrite => entry.set_values(&self.ldap_attribute, fixed),
            ConflictPolicy::Preserve => {
                if !entry.has_attribute(&self.ldap_attribute) {
                    entry.set_values(&self.ldap_attribute, fixed);
                }
            }
            ConflictPolicy::Merge => {
                let existing = entry.values(&self.ldap_attribute).to_vec();
                for value in fixed {
                    if !existing.contains(&value) {
                        entry.add_value(&self.ldap_attribute, value);
                    }
                }
            }
        }
    }
}

//! SCIM filter model, parser, and in-memory evaluator.
//!
//! Filters arrive as request strings, are parsed once into a [`Filter`]
//! tree, and are then either translated to an LDAP filter by the resource
//! mapper or evaluated in memory against a [`ScimObject`] when the
//! translation is partial.

mod eval;
mod parser;

use crate::error::ScimResult;
use crate::resource::ScimObject;
use crate::schema::ResourceDescriptor;

/// Comparison operator of a filter leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equality under the descriptor's case rule
    Eq,
    /// Substring containment
    Co,
    /// Prefix match
    Sw,
    /// Present with at least one value
    Pr,
    /// Strictly greater
    Gt,
    /// Greater or equal
    Ge,
    /// Strictly less
    Lt,
    /// Less or equal
    Le,
}

impl FilterOp {
    /// Parse an operator word, case-insensitively.
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "co" => Some(Self::Co),
            "sw" => Some(Self::Sw),
            "pr" => Some(Self::Pr),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }

    /// The operator word as it appears in filter strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Co => "co",
            Self::Sw => "sw",
            Self::Pr => "pr",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }

    /// Whether the operator takes a comparison value (`pr` does not).
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::Pr)
    }
}

/// An attribute path: `[schema ":"] name ["." subName]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    /// Explicit schema URN, if the path carries one
    pub schema: Option<String>,
    /// Top-level attribute name
    pub name: String,
    /// Sub-attribute name, if the path descends into a complex attribute
    pub sub: Option<String>,
}

impl AttributePath {
    /// Create a path with no explicit schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            sub: None,
        }
    }

    /// Create a path descending into a sub-attribute.
    pub fn with_sub(name: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            sub: Some(sub.into()),
        }
    }

    /// Parse a path string.
    ///
    /// URNs contain both `:` and `.`, so the schema part extends to the last
    /// `:` and the sub-attribute split happens on the remainder only.
    pub fn parse(input: &str) -> Result<Self, String> {
        let (schema, rest) = match input.rfind(':') {
            Some(idx) => (Some(input[..idx].to_string()), &input[idx + 1..]),
            None => (None, input),
        };
        if schema.as_deref().is_some_and(str::is_empty) {
            return Err(format!("empty schema in path '{input}'"));
        }
        let (name, sub) = match rest.split_once('.') {
            Some((name, sub)) => (name, Some(sub.to_string())),
            None => (rest, None),
        };
        if name.is_empty() || sub.as_deref().is_some_and(str::is_empty) {
            return Err(format!("malformed attribute path '{input}'"));
        }
        Ok(Self {
            schema,
            name: name.to_string(),
            sub,
        })
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{schema}:")?;
        }
        write!(f, "{}", self.name)?;
        if let Some(sub) = &self.sub {
            write!(f, ".{sub}")?;
        }
        Ok(())
    }
}

/// A parsed SCIM filter.
///
/// Leaf values are stored as the raw literal text; typing happens against
/// the target descriptor at evaluation or translation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every child must match
    And(Vec<Filter>),
    /// At least one child must match
    Or(Vec<Filter>),
    /// A single comparison
    Compare {
        /// Attribute path the comparison applies to
        path: AttributePath,
        /// Comparison operator
        op: FilterOp,
        /// Raw literal, absent for `pr`
        value: Option<String>,
    },
}

impl Filter {
    /// Parse a SCIM filter string.
    pub fn parse(input: &str) -> ScimResult<Self> {
        parser::parse(input)
    }

    /// Evaluate this filter against an in-memory object.
    pub fn matches(&self, object: &ScimObject, resource: &ResourceDescriptor) -> bool {
        eval::matches(self, object, resource)
    }

    /// Whether the tree contains a strict `gt`/`lt` comparison, whose LDAP
    /// translation is widened and needs in-memory correction.
    pub fn contains_strict_inequality(&self) -> bool {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                children.iter().any(Filter::contains_strict_inequality)
            }
            Filter::Compare { op, .. } => matches!(op, FilterOp::Gt | FilterOp::Lt),
        }
    }
}

//! LDAP data model and the directory client contract the core consumes.
//!
//! The gateway never opens an LDAP connection itself; it issues operations
//! through the [`DirectoryClient`] trait and leaves transport, TLS, and
//! timeouts to the implementation. [`in_memory::InMemoryDirectory`] provides
//! a complete in-process implementation for tests and examples.

pub mod filter;
pub mod in_memory;

use async_trait::async_trait;

use crate::resource::RequestContext;

pub use filter::LdapFilter;
pub use in_memory::InMemoryDirectory;

/// A directory entry: a DN plus a case-insensitive bag of typed attributes,
/// each holding one or more octet-string values in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    /// Distinguished name of the entry
    pub dn: String,
    attributes: std::collections::BTreeMap<String, EntryAttribute>,
}

/// One attribute of an entry, preserving the attribute type's original
/// spelling alongside its values.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryAttribute {
    /// Attribute type as first written
    pub name: String,
    /// Values in server order
    pub values: Vec<Vec<u8>>,
}

impl Entry {
    /// Create an empty entry with the given DN.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Default::default(),
        }
    }

    /// Append one value to an attribute, creating the attribute if needed.
    pub fn add_value(&mut self, attribute: &str, value: impl Into<Vec<u8>>) {
        let slot = self
            .attributes
            .entry(attribute.to_lowercase())
            .or_insert_with(|| EntryAttribute {
                name: attribute.to_string(),
                values: Vec::new(),
            });
        slot.values.push(value.into());
    }

    /// Append a UTF-8 string value.
    pub fn add_str_value(&mut self, attribute: &str, value: &str) {
        self.add_value(attribute, value.as_bytes().to_vec());
    }

    /// Replace every value of an attribute; an empty set removes it.
    pub fn set_values(&mut self, attribute: &str, values: Vec<Vec<u8>>) {
        if values.is_empty() {
            self.attributes.remove(&attribute.to_lowercase());
        } else {
            self.attributes.insert(
                attribute.to_lowercase(),
                EntryAttribute {
                    name: attribute.to_string(),
                    values,
                },
            );
        }
    }

    /// Remove an attribute entirely.
    pub fn remove_attribute(&mut self, attribute: &str) -> Option<EntryAttribute> {
        self.attributes.remove(&attribute.to_lowercase())
    }

    /// All values of an attribute, in server order.
    pub fn values(&self, attribute: &str) -> &[Vec<u8>] {
        self.attributes
            .get(&attribute.to_lowercase())
            .map(|attr| attr.values.as_slice())
            .unwrap_or(&[])
    }

    /// The first value of an attribute.
    pub fn first_value(&self, attribute: &str) -> Option<&[u8]> {
        self.values(attribute).first().map(Vec::as_slice)
    }

    /// The first value of an attribute, decoded as UTF-8.
    pub fn first_value_str(&self, attribute: &str) -> Option<String> {
        self.first_value(attribute)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// All values of an attribute, decoded as UTF-8.
    pub fn string_values(&self, attribute: &str) -> Vec<String> {
        self.values(attribute)
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    /// Whether the attribute is present with at least one value.
    pub fn has_attribute(&self, attribute: &str) -> bool {
        !self.values(attribute).is_empty()
    }

    /// Iterate over attributes in type order.
    pub fn attributes(&self) -> impl Iterator<Item = &EntryAttribute> {
        self.attributes.values()
    }

    /// Keep only the listed attribute types; an empty list keeps everything.
    pub fn project(&self, attributes: &[String]) -> Entry {
        if attributes.is_empty() {
            return self.clone();
        }
        let mut projected = Entry::new(self.dn.clone());
        for wanted in attributes {
            if let Some(attr) = self.attributes.get(&wanted.to_lowercase()) {
                projected
                    .attributes
                    .insert(wanted.to_lowercase(), attr.clone());
            }
        }
        projected
    }
}

/// LDAP search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The base entry only
    Base,
    /// Immediate children of the base
    One,
    /// The base and its whole subtree
    Sub,
}

/// Kind of a directory modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationType {
    /// Add the listed values
    Add,
    /// Delete the listed values, or the whole attribute when empty
    Delete,
    /// Replace all values with the listed ones
    Replace,
}

/// One modification of a directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    /// What to do
    pub kind: ModificationType,
    /// Attribute type being modified
    pub attribute: String,
    /// Values the modification applies
    pub values: Vec<Vec<u8>>,
}

impl Modification {
    /// Convenience constructor.
    pub fn new(kind: ModificationType, attribute: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            kind,
            attribute: attribute.into(),
            values,
        }
    }
}

/// Server-side sort key for a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Attribute type to sort on
    pub attribute: String,
    /// Ascending (`true`) or descending order
    pub ascending: bool,
}

/// LDAP result codes the gateway distinguishes.
///
/// Anything else arrives as [`ResultCode::Other`] and maps to a generic
/// server error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// 32
    NoSuchObject,
    /// 49
    InvalidCredentials,
    /// 50
    InsufficientAccessRights,
    /// 51
    Busy,
    /// 52
    Unavailable,
    /// 53
    UnwillingToPerform,
    /// 68
    EntryAlreadyExists,
    /// Any other code
    Other(u16),
}

impl ResultCode {
    /// The numeric protocol code.
    pub fn code(&self) -> u16 {
        match self {
            Self::NoSuchObject => 32,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::EntryAlreadyExists => 68,
            Self::Other(code) => *code,
        }
    }
}

/// Failures surfaced by a [`DirectoryClient`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectoryError {
    /// The directory returned a non-success result code
    #[error("directory result {}: {message}", code.code())]
    Operation {
        /// LDAP result code
        code: ResultCode,
        /// Diagnostic message
        message: String,
    },

    /// The connection to the directory failed
    #[error("directory connection failure: {0}")]
    Connection(String),

    /// The request context was cancelled mid-operation
    #[error("directory operation cancelled")]
    Cancelled,
}

impl DirectoryError {
    /// Create an operation error.
    pub fn operation(code: ResultCode, message: impl Into<String>) -> Self {
        Self::Operation {
            code,
            message: message.into(),
        }
    }

    /// A `noSuchObject` error for the given DN.
    pub fn no_such_object(dn: &str) -> Self {
        Self::operation(ResultCode::NoSuchObject, format!("no such entry: {dn}"))
    }
}

/// The directory operations the gateway consumes.
///
/// Implementations must be safe for concurrent use; the gateway may issue
/// secondary lookups for derived attributes in parallel against the same
/// client. Implementations are expected to abort in-flight operations when
/// the context is cancelled and surface [`DirectoryError::Cancelled`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Execute a search and collect the matching entries in server order.
    async fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
        sort: Option<&SortKey>,
        ctx: &RequestContext,
    ) -> Result<Vec<Entry>, DirectoryError>;

    /// Read a single entry by DN; `None` when the entry does not exist.
    async fn read(
        &self,
        dn: &str,
        attributes: &[String],
        ctx: &RequestContext,
    ) -> Result<Option<Entry>, DirectoryError>;

    /// Add a new entry.
    async fn add(&self, entry: &Entry, ctx: &RequestContext) -> Result<(), DirectoryError>;

    /// Apply modifications to the entry named by `dn`.
    async fn modify(
        &self,
        dn: &str,
        modifications: &[Modification],
        ctx: &RequestContext,
    ) -> Result<(), DirectoryError>;

    /// Delete the entry named by `dn`.
    async fn delete(&self, dn: &str, ctx: &RequestContext) -> Result<(), DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_attributes_are_case_insensitive() {
        let mut entry = Entry::new("uid=bjensen,ou=People,dc=example,dc=com");
        entry.add_str_value("objectClass", "inetOrgPerson");
        entry.add_str_value("OBJECTCLASS", "person");
        assert_eq!(entry.string_values("objectclass"), vec!["inetOrgPerson", "person"]);
        assert!(entry.has_attribute("ObjectClass"));
    }

    #[test]
    fn projection_keeps_only_requested_types() {
        let mut entry = Entry::new("uid=a,dc=example,dc=com");
        entry.add_str_value("uid", "a");
        entry.add_str_value("sn", "Jensen");
        let projected = entry.project(&["uid".to_string()]);
        assert!(projected.has_attribute("uid"));
        assert!(!projected.has_attribute("sn"));
        assert_eq!(entry.project(&[]), entry);
    }

    #[test]
    fn set_values_with_empty_set_removes_the_attribute() {
        let mut entry = Entry::new("uid=a,dc=example,dc=com");
        entry.add_str_value("mail", "a@example.com");
        entry.set_values("mail", vec![]);
        assert!(!entry.has_attribute("mail"));
    }
}

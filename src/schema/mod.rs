//! Schema metadata for SCIM resources.
//!
//! A resource's shape is described entirely by immutable
//! [`AttributeDescriptor`] records, created once when the mapping
//! configuration is loaded. The [`SchemaRegistry`] indexes descriptors by
//! endpoint and by `(schema URN, attribute name)` key, both case-insensitive.

pub mod registry;
pub mod types;

pub use registry::{ResourceDescriptor, SchemaRegistry};
pub use types::{AttributeDescriptor, DataType};

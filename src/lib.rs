//! # SCIM/LDAP Gateway Core
//!
//! A resource mapping engine that exposes an LDAP directory through the SCIM
//! REST protocol. The crate translates SCIM operations (create, get, query,
//! replace, patch, delete) into LDAP operations against a configured
//! directory backend and maps entries back into schema-described SCIM
//! resources, serialized to JSON or XML.
//!
//! ## What's inside
//!
//! - A declarative mapping configuration binding SCIM attributes to LDAP
//!   attribute types, with value transformations, DN templates, fixed
//!   attributes, and derived (computed) attributes
//! - A SCIM filter parser, an LDAP filter translator (with in-memory
//!   post-filtering when the translation is partial), sort and paging
//! - Deterministic JSON and XML codecs sharing one in-memory resource model
//!
//! The HTTP transport, TLS, authentication, and the real LDAP connection are
//! external collaborators: the core consumes a [`ldap::DirectoryClient`] and
//! exposes [`service::LdapResourceService`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scim_ldap_gateway::config;
//! use scim_ldap_gateway::ldap::InMemoryDirectory;
//! use scim_ldap_gateway::resource::{QueryAttributes, RequestContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let document = std::fs::read_to_string("resources.json")?;
//! let directory = Arc::new(InMemoryDirectory::new());
//! let service = config::build_service(&document, directory)?;
//!
//! let ctx = RequestContext::with_generated_id();
//! let user = service
//!     .get("Users", "bjensen", &QueryAttributes::all(), &ctx)
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(
//!     &scim_ldap_gateway::wire::json::marshal_object(
//!         service.mapper("Users")?.resource(),
//!         &user,
//!     ),
//! )?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod mapper;
pub mod mapping;
pub mod resource;
pub mod schema;
pub mod service;
pub mod transform;
pub mod wire;

// Core re-exports for library users
pub use error::{ConfigError, ScimError, ScimResult};
pub use filter::{AttributePath, Filter, FilterOp};
pub use ldap::{DirectoryClient, DirectoryError, Entry, InMemoryDirectory};
pub use mapper::ResourceMapper;
pub use resource::{
    ListResponse, PageParameters, QueryAttributes, RequestContext, ScimAttribute, ScimObject,
    SimpleValue, SortParameters,
};
pub use schema::{AttributeDescriptor, DataType, ResourceDescriptor, SchemaRegistry};
pub use service::LdapResourceService;

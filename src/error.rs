//! Error types for the SCIM/LDAP gateway core.
//!
//! Every failure the core can produce carries an HTTP-style status code so the
//! transport layer can serialize it without inspecting the error kind. The
//! directory-facing error type lives in [`crate::ldap`]; this module defines
//! the SCIM-facing kinds and the status mapping between the two.

use crate::ldap::{DirectoryError, ResultCode};

/// Main error type for gateway operations.
///
/// Each variant corresponds to one row of the gateway's error table and maps
/// to a fixed HTTP status code via [`ScimError::status`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScimError {
    /// Unparseable or semantically invalid SCIM filter
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Missing required attribute, unresolvable DN template, or unknown
    /// attribute path on create/replace
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Value fails descriptor typing or transformation
    #[error("Invalid attribute value: {0}")]
    InvalidAttributeValue(String),

    /// Sort path does not resolve to a mapped attribute
    #[error("Invalid sort: {0}")]
    InvalidSort(String),

    /// Propagated from the directory
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Propagated from the directory
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entry absent or hidden by the resource search filter
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate entry on create
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Version mismatch on replace/patch
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Unexpected directory failure or internal invariant violation
    #[error("Server error: {0}")]
    ServerError(String),

    /// Directory connection failure
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The request was cancelled before the directory operation completed
    #[error("Request cancelled")]
    Cancelled,
}

impl ScimError {
    /// The HTTP status code the transport should emit for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidFilter(_)
            | Self::InvalidResource(_)
            | Self::InvalidAttributeValue(_)
            | Self::InvalidSort(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::PreconditionFailed(_) => 412,
            Self::ServerError(_) => 500,
            Self::ServiceUnavailable(_) => 503,
            // 499 is the de-facto client-closed-request code.
            Self::Cancelled => 499,
        }
    }

    /// The human-readable detail message, without the kind prefix.
    pub fn description(&self) -> &str {
        match self {
            Self::InvalidFilter(m)
            | Self::InvalidResource(m)
            | Self::InvalidAttributeValue(m)
            | Self::InvalidSort(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::PreconditionFailed(m)
            | Self::ServerError(m)
            | Self::ServiceUnavailable(m) => m,
            Self::Cancelled => "request cancelled",
        }
    }

    /// Reconstruct an error from a wire-form status code and description.
    ///
    /// Used when parsing the error wire forms. Status codes outside the
    /// gateway's table collapse onto the nearest generic kind.
    pub fn from_status(status: u16, description: impl Into<String>) -> Self {
        let description = description.into();
        match status {
            400 => Self::InvalidResource(description),
            401 => Self::Unauthorized(description),
            403 => Self::Forbidden(description),
            404 => Self::NotFound(description),
            409 => Self::Conflict(description),
            412 => Self::PreconditionFailed(description),
            503 => Self::ServiceUnavailable(description),
            _ => Self::ServerError(description),
        }
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter(message.into())
    }

    /// Create an invalid resource error.
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource(message.into())
    }

    /// Create an invalid attribute value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidAttributeValue(message.into())
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::ServerError(message.into())
    }
}

impl From<DirectoryError> for ScimError {
    /// Map a directory failure onto the SCIM error table.
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::Cancelled => Self::Cancelled,
            DirectoryError::Connection(message) => Self::ServiceUnavailable(message),
            DirectoryError::Operation { code, message } => match code {
                ResultCode::NoSuchObject => Self::NotFound(message),
                ResultCode::EntryAlreadyExists => Self::Conflict(message),
                ResultCode::InvalidCredentials => Self::Unauthorized(message),
                ResultCode::InsufficientAccessRights => Self::Forbidden(message),
                ResultCode::Busy | ResultCode::Unavailable => Self::ServiceUnavailable(message),
                _ => Self::ServerError(message),
            },
        }
    }
}

/// Errors raised while loading the mapping configuration document.
///
/// These are startup-time failures and never reach a request path.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document itself could not be parsed
    #[error("Malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A declared attribute violates a descriptor invariant
    #[error("Invalid attribute declaration '{attribute}': {message}")]
    InvalidAttribute {
        /// The offending attribute name
        attribute: String,
        /// What rule the declaration violates
        message: String,
    },

    /// A transformation name has no registry entry
    #[error("Unknown transformation '{0}'")]
    UnknownTransformation(String),

    /// A derivation name has no registry entry
    #[error("Unknown derivation '{0}'")]
    UnknownDerivation(String),

    /// A DN template or LDAP search filter failed to parse
    #[error("Invalid resource declaration '{resource}': {message}")]
    InvalidResource {
        /// The offending resource name
        resource: String,
        /// What part of the declaration is invalid
        message: String,
    },
}

/// Result alias for request-path operations.
pub type ScimResult<T> = Result<T, ScimError>;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

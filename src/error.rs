//! Error types for provisioning operations.
//!
//! Every failure surfaced by this crate is a [`ProvisioningError`]. Callers that
//! need to decide between retrying and failing fast should look at
//! [`ProvisioningError::kind`] rather than matching on individual variants.

use crate::connector::ConnectorError;
use crate::repository::RepositoryError;
use crate::resource::ResourceDefinition;

/// Coarse classification of provisioning failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed object does not exist. Fatal to the calling operation.
    ObjectNotFound,
    /// Data does not conform to the schema. Fatal.
    SchemaViolation,
    /// Deployment defect such as a malformed override or unknown strategy. Fatal.
    Configuration,
    /// The connector or the external system could not be reached. Transient.
    Communication,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Whether a higher layer may retry the operation.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Communication)
    }
}

/// Main error type for provisioning operations.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// Object not found in the repository
    #[error("Object not found: {object_type} with OID {oid}")]
    ObjectNotFound { object_type: String, oid: String },

    /// Schema violation (unknown attribute, unknown object class, bad matching rule)
    #[error("Schema violation: {message}")]
    SchemaViolation { message: String },

    /// Misconfiguration of a resource or of the provisioning core
    #[error("Configuration error: {message}")]
    Misconfiguration { message: String },

    /// The connector could not reach the external system
    #[error("Connector unreachable: {message}")]
    ConnectorUnreachable { message: String },

    /// Non-transient connector failure
    #[error("Connector error: {0}")]
    Connector(ConnectorError),

    /// Repository failure other than not-found
    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource completion failed; the partial definition is kept for diagnostics
    #[error("Completion of resource {oid} failed: {source}")]
    CompletionFailed {
        oid: String,
        #[source]
        source: Box<ProvisioningError>,
        partial: Option<Box<ResourceDefinition>>,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProvisioningError {
    /// Create an object not found error
    pub fn object_not_found(object_type: impl Into<String>, oid: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            object_type: object_type.into(),
            oid: oid.into(),
        }
    }

    /// Create a schema violation error
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn misconfiguration(message: impl Into<String>) -> Self {
        Self::Misconfiguration {
            message: message.into(),
        }
    }

    /// Create a communication error
    pub fn connector_unreachable(message: impl Into<String>) -> Self {
        Self::ConnectorUnreachable {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::Misconfiguration { .. } => ErrorKind::Configuration,
            Self::ConnectorUnreachable { .. } => ErrorKind::Communication,
            Self::Connector(e) => e.kind(),
            Self::Repository(e) => e.kind(),
            Self::Json(_) => ErrorKind::SchemaViolation,
            Self::CompletionFailed { source, .. } => source.kind(),
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Partial definition attached to a failed completion, if any.
    pub fn partial_definition(&self) -> Option<&ResourceDefinition> {
        match self {
            Self::CompletionFailed { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }
}

impl From<ConnectorError> for ProvisioningError {
    fn from(error: ConnectorError) -> Self {
        match error {
            ConnectorError::Unreachable { message } => Self::ConnectorUnreachable { message },
            ConnectorError::Timeout { operation, seconds } => Self::ConnectorUnreachable {
                message: format!("{} timed out after {}s", operation, seconds),
            },
            ConnectorError::InvalidConfiguration { message } => Self::Misconfiguration { message },
            other => Self::Connector(other),
        }
    }
}

impl From<RepositoryError> for ProvisioningError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { object_type, oid } => {
                Self::ObjectNotFound { object_type, oid }
            }
            other => Self::Repository(other),
        }
    }
}

/// Errors raised while assembling a [`ResourceManager`](crate::resource::ResourceManager).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Repository was not configured
    #[error("Repository is required but not provided")]
    MissingRepository,

    /// Connector framework was not configured
    #[error("Connector framework is required but not provided")]
    MissingConnectorFramework,

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
pub type BuildResult<T> = Result<T, BuildError>;

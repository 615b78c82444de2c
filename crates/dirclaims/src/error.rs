//! Directory claim error types
//!
//! Error definitions with transient/permanent classification. Data-shape
//! problems (unparsable values, missing source attributes) never surface
//! here; they degrade to absent claims instead.

use thiserror::Error;

use crate::reconcile::ModifyOperation;

/// Error that can occur while talking to a directory through the adapter.
#[derive(Debug, Error)]
pub enum ClaimsError {
    // Configuration errors (permanent)
    /// A required configuration option was not provided.
    #[error("missing required option: {option}")]
    MissingOption { option: &'static str },

    /// A configuration value is present but unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The mapping specification cannot be used for the requested operation.
    #[error("invalid mapping: {message}")]
    InvalidMapping { message: String },

    // Session errors
    /// The adapter holds no authenticated session.
    #[error("no directory session; bind first")]
    NotConnected,

    /// Failed to establish a connection to the directory.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The directory rejected the supplied credentials.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Entry errors
    /// A non-empty claim payload produced no directory attributes.
    #[error("payload for '{id}' maps to no directory attribute")]
    LostPayload { id: String },

    /// Entry does not exist in the directory.
    #[error("entry not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Entry already exists in the directory.
    #[error("entry already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// A directory operation failed.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single attribute modification was rejected.
    #[error("{operation} of attribute '{attribute}' failed: {message}")]
    MutationFailed {
        attribute: String,
        operation: ModifyOperation,
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl ClaimsError {
    /// Check if this error is transient and the operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClaimsError::ConnectionFailed { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ClaimsError::MissingOption { .. } => "MISSING_OPTION",
            ClaimsError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ClaimsError::InvalidMapping { .. } => "INVALID_MAPPING",
            ClaimsError::NotConnected => "NOT_CONNECTED",
            ClaimsError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ClaimsError::AuthenticationFailed => "AUTH_FAILED",
            ClaimsError::LostPayload { .. } => "LOST_PAYLOAD",
            ClaimsError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ClaimsError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ClaimsError::OperationFailed { .. } => "OPERATION_FAILED",
            ClaimsError::MutationFailed { .. } => "MUTATION_FAILED",
            ClaimsError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    // Convenience constructors

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ClaimsError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ClaimsError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ClaimsError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ClaimsError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ClaimsError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for ClaimsError {
    fn from(err: serde_json::Error) -> Self {
        ClaimsError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for adapter operations.
pub type ClaimsResult<T> = Result<T, ClaimsError>;

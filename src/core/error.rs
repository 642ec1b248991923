//! Typed error handling for crossbind
//!
//! Every failure the binding layer can produce is a [`BindError`]. The
//! category enums keep the three families of the error taxonomy apart:
//!
//! - [`ValidationError`]: a field was missing or did not validate (4xx)
//! - [`RequestError`]: the request itself was unusable, including
//!   authentication failures produced by a backend's error factory
//! - [`ConfigError`]: construction-time misconfiguration, raised before any
//!   request is served
//! - [`DependencyError`]: failures inside the dependency resolver
//!
//! # Example
//!
//! ```rust,ignore
//! use crossbind::prelude::*;
//!
//! match endpoint.call(&request).await {
//!     Ok(reply) => println!("{:?}", reply.status),
//!     Err(BindError::Validation(ValidationError::FieldErrors(errors))) => {
//!         for e in errors {
//!             println!("{} ({}): {}", e.field, e.location, e.message);
//!         }
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type for crossbind
#[derive(Debug)]
pub enum BindError {
    /// Field validation errors
    Validation(ValidationError),

    /// HTTP/request errors, including authentication failures
    Request(RequestError),

    /// Configuration errors
    Config(ConfigError),

    /// Dependency resolution errors
    Dependency(DependencyError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::Validation(e) => write!(f, "{}", e),
            BindError::Request(e) => write!(f, "{}", e),
            BindError::Config(e) => write!(f, "{}", e),
            BindError::Dependency(e) => write!(f, "{}", e),
            BindError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindError::Validation(e) => Some(e),
            BindError::Request(e) => Some(e),
            BindError::Config(e) => Some(e),
            BindError::Dependency(e) => Some(e),
            BindError::Internal(_) => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl BindError {
    /// Build the not-authenticated error most security schemes raise
    pub fn not_authenticated(
        status: StatusCode,
        message: impl Into<String>,
        headers: HeaderMap,
    ) -> Self {
        BindError::Request(RequestError::NotAuthenticated {
            status,
            message: message.into(),
            headers,
        })
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            BindError::Validation(e) if e.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            BindError::Validation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BindError::Request(e) => e.status_code(),
            BindError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BindError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BindError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            BindError::Validation(e) => e.error_code(),
            BindError::Request(e) => e.error_code(),
            BindError::Config(_) => "CONFIG_ERROR",
            BindError::Dependency(e) => e.error_code(),
            BindError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Extra response headers carried by the error (e.g. `WWW-Authenticate`)
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            BindError::Request(RequestError::NotAuthenticated { headers, .. }) => Some(headers),
            _ => None,
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            // Authentication failures keep the bare message, it is part of the contract
            BindError::Request(RequestError::NotAuthenticated { message, .. }) => message.clone(),
            other => other.to_string(),
        };
        ErrorResponse {
            code: self.error_code().to_string(),
            message,
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            BindError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            BindError::Validation(ValidationError::Field(error)) => {
                Some(serde_json::json!({ "fields": [error] }))
            }
            BindError::Request(RequestError::UnsupportedMediaType { expected, actual }) => {
                Some(serde_json::json!({
                    "expected": expected,
                    "actual": actual
                }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for BindError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let headers = self.headers().cloned().unwrap_or_default();
        let body = Json(self.to_response());
        (status, headers, body).into_response()
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to field validation
#[derive(Debug)]
pub enum ValidationError {
    /// Single field validation error
    Field(FieldValidationError),

    /// Multiple field validation errors
    FieldErrors(Vec<FieldValidationError>),

    /// Invalid JSON format
    InvalidJson { message: String },

    /// Missing resolved argument
    MissingArgument { argument: String },
}

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    /// Request key of the field (alias if one is bound)
    pub field: String,
    /// Where the field was read from (`query`, `header`, ...)
    pub location: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(
        field: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Field(e) => {
                write!(
                    f,
                    "Validation error for {} field '{}': {}",
                    e.location, e.field, e.message
                )
            }
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON: {}", message)
            }
            ValidationError::MissingArgument { argument } => {
                write!(f, "Missing required argument: {}", argument)
            }
        }
    }
}

impl ValidationError {
    /// Failures caused by the request itself; the other variants are server bugs
    pub fn is_client_error(&self) -> bool {
        matches!(self, ValidationError::Field(_) | ValidationError::FieldErrors(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::Field(_) | ValidationError::FieldErrors(_) => "VALIDATION_ERROR",
            ValidationError::InvalidJson { .. } => "SERIALIZATION_ERROR",
            ValidationError::MissingArgument { .. } => "MISSING_ARGUMENT",
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for BindError {
    fn from(err: ValidationError) -> Self {
        BindError::Validation(err)
    }
}

impl From<FieldValidationError> for BindError {
    fn from(err: FieldValidationError) -> Self {
        BindError::Validation(ValidationError::Field(err))
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests
#[derive(Debug)]
pub enum RequestError {
    /// Body could not be read or parsed
    InvalidBody { message: String },

    /// Body required but empty
    MissingBody,

    /// A path segment did not decode to UTF-8
    InvalidPath { message: String },

    /// Content type does not fit the accessor
    UnsupportedMediaType {
        expected: String,
        actual: Option<String>,
    },

    /// Authentication failed; produced by a backend's error factory
    NotAuthenticated {
        status: StatusCode,
        message: String,
        headers: HeaderMap,
    },

    /// Forbidden operation
    Forbidden { message: String },

    /// No route for path
    NotFound { path: String },

    /// Method not allowed
    MethodNotAllowed { method: String, path: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidBody { message } => {
                write!(f, "Invalid request body: {}", message)
            }
            RequestError::MissingBody => write!(f, "Request body is empty"),
            RequestError::InvalidPath { message } => write!(f, "Invalid URL: {}", message),
            RequestError::UnsupportedMediaType { expected, actual } => match actual {
                Some(actual) => write!(
                    f,
                    "Unsupported media type '{}', expected {}",
                    actual, expected
                ),
                None => write!(f, "Missing content type, expected {}", expected),
            },
            RequestError::NotAuthenticated { message, .. } => {
                write!(f, "Unauthorized: {}", message)
            }
            RequestError::Forbidden { message } => {
                write!(f, "Forbidden: {}", message)
            }
            RequestError::NotFound { path } => write!(f, "No route for {}", path),
            RequestError::MethodNotAllowed { method, path } => {
                write!(f, "Method {} not allowed on {}", method, path)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            RequestError::MissingBody => StatusCode::BAD_REQUEST,
            RequestError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            RequestError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RequestError::NotAuthenticated { status, .. } => *status,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
            RequestError::NotFound { .. } => StatusCode::NOT_FOUND,
            RequestError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::MissingBody => "MISSING_BODY",
            RequestError::InvalidPath { .. } => "INVALID_PATH",
            RequestError::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            RequestError::NotAuthenticated { .. } => "NOT_AUTHENTICATED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
            RequestError::NotFound { .. } => "NOT_FOUND",
            RequestError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
        }
    }
}

impl From<RequestError> for BindError {
    fn from(err: RequestError) -> Self {
        BindError::Request(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Construction-time configuration errors
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Configuration file not found
    FileNotFound { path: String },

    /// IO error while reading configuration
    IoError { message: String },

    /// Backend name does not match a registered backend
    UnknownBackend { name: String },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Missing required part while building something
    MissingField { field: String, context: String },

    /// A field already carries a custom alias
    AliasAlreadyBound { alias: String },

    /// A field already carries a custom missing-value hook
    NotFoundHookAlreadyBound,

    /// A security scheme was given a field of the wrong kind
    UnsupportedLocation { scheme: String, location: String },

    /// Two parameters of one endpoint share a name or request key
    DuplicateParameter { endpoint: String, name: String },

    /// Declared parameters disagree with the route or handler
    SignatureMismatch { endpoint: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::FileNotFound { path } => {
                write!(f, "Configuration file not found: {}", path)
            }
            ConfigError::IoError { message } => write!(f, "IO error: {}", message),
            ConfigError::UnknownBackend { name } => {
                write!(f, "Unknown backend '{}'", name)
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::MissingField { field, context } => {
                write!(f, "Missing required field '{}' in {}", field, context)
            }
            ConfigError::AliasAlreadyBound { alias } => {
                write!(
                    f,
                    "Custom alias parameters are not allowed (field already aliased to '{}')",
                    alias
                )
            }
            ConfigError::NotFoundHookAlreadyBound => {
                write!(f, "Custom missing-value handlers are not allowed")
            }
            ConfigError::UnsupportedLocation { scheme, location } => {
                write!(
                    f,
                    "Security scheme '{}' cannot read its credentials from {}",
                    scheme, location
                )
            }
            ConfigError::DuplicateParameter { endpoint, name } => {
                write!(f, "Duplicate parameter '{}' on {}", name, endpoint)
            }
            ConfigError::SignatureMismatch { endpoint, message } => {
                write!(f, "Signature mismatch on {}: {}", endpoint, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for BindError {
    fn from(err: ConfigError) -> Self {
        BindError::Config(err)
    }
}

// =============================================================================
// Dependency Errors
// =============================================================================

/// Errors raised while resolving dependencies
#[derive(Debug)]
pub enum DependencyError {
    /// Nesting exceeded the resolver's depth limit
    TooDeep { name: String, depth: usize },

    /// A resolved argument does not fit the requested type
    Deserialize { argument: String, message: String },

    /// A provider failed
    Failed { name: String, message: String },
}

impl fmt::Display for DependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyError::TooDeep { name, depth } => {
                write!(f, "Dependency '{}' nested too deep (depth {})", name, depth)
            }
            DependencyError::Deserialize { argument, message } => {
                write!(f, "Argument '{}' has an unexpected type: {}", argument, message)
            }
            DependencyError::Failed { name, message } => {
                write!(f, "Dependency '{}' failed: {}", name, message)
            }
        }
    }
}

impl std::error::Error for DependencyError {}

impl DependencyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            DependencyError::TooDeep { .. } => "DEPENDENCY_TOO_DEEP",
            DependencyError::Deserialize { .. } => "ARGUMENT_TYPE_MISMATCH",
            DependencyError::Failed { .. } => "DEPENDENCY_FAILED",
        }
    }
}

impl From<DependencyError> for BindError {
    fn from(err: DependencyError) -> Self {
        BindError::Dependency(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for BindError {
    fn from(err: serde_json::Error) -> Self {
        BindError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for BindError {
    fn from(err: std::io::Error) -> Self {
        BindError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for BindError {
    fn from(err: serde_yaml::Error) -> Self {
        BindError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

impl From<anyhow::Error> for BindError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<BindError>() {
            Ok(bind_err) => bind_err,
            Err(other) => BindError::Internal(other.to_string()),
        }
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for crossbind operations
pub type BindResult<T> = Result<T, BindError>;

//! HTTP backends and explicit backend selection
//!
//! A backend bundles everything that differs between host frameworks:
//!
//! - the request adapter wrapping its native request type,
//! - the error factory used when authentication fails,
//! - how errors are rendered into responses.
//!
//! Which backend is active is never guessed from the process state. It is
//! named in [`BindConfig`](crate::config::BindConfig) and resolved once at
//! startup through a [`BackendRegistry`].

pub mod axum;
pub mod hyper;
pub mod mock;

use crate::config::BindConfig;
use crate::core::error::{BindError, BindResult, ConfigError};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use self::axum::{AxumBackend, AxumRequest};
pub use self::hyper::{HyperBackend, HyperRequest};
pub use self::mock::{MockBackend, MockRequest};

/// Names of the built-in backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Axum,
    Hyper,
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Axum => "axum",
            BackendKind::Hyper => "hyper",
            BackendKind::Mock => "mock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "axum" => Ok(BackendKind::Axum),
            "hyper" => Ok(BackendKind::Hyper),
            "mock" => Ok(BackendKind::Mock),
            other => Err(ConfigError::UnknownBackend {
                name: other.to_string(),
            }),
        }
    }
}

/// Strategy object for one host framework
pub trait Backend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Error factory for failed authentication
    fn not_authenticated(&self, status: StatusCode, message: &str, headers: HeaderMap) -> BindError {
        BindError::not_authenticated(status, message, headers)
    }

    /// Status used for field validation failures
    fn validation_status(&self) -> StatusCode {
        StatusCode::UNPROCESSABLE_ENTITY
    }

    fn status_for(&self, err: &BindError) -> StatusCode {
        match err {
            BindError::Validation(e) if e.is_client_error() => self.validation_status(),
            other => other.status_code(),
        }
    }

    /// Render an error as a response; JSON [`ErrorResponse`](crate::core::error::ErrorResponse) by default
    fn render_error(&self, err: &BindError) -> Response<Full<Bytes>> {
        let body = serde_json::to_vec(&err.to_response()).unwrap_or_default();
        error_response(
            self.status_for(err),
            err.headers(),
            "application/json",
            Bytes::from(body),
        )
    }
}

pub(crate) fn error_response(
    status: StatusCode,
    headers: Option<&HeaderMap>,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(headers) = headers {
        response.headers_mut().extend(headers.clone());
    }
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Lookup table from backend name to strategy object
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Registry holding the built-in backends
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AxumBackend));
        registry.register(Arc::new(HyperBackend));
        registry.register(Arc::new(MockBackend));
        registry
    }

    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register (or replace) a backend under its kind
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn resolve(&self, kind: BackendKind) -> BindResult<Arc<dyn Backend>> {
        self.backends.get(&kind).cloned().ok_or_else(|| {
            ConfigError::UnknownBackend {
                name: kind.to_string(),
            }
            .into()
        })
    }

    /// Resolve the backend named in the configuration
    pub fn from_config(&self, config: &BindConfig) -> BindResult<Arc<dyn Backend>> {
        let backend = self.resolve(config.backend)?;
        tracing::debug!(backend = %config.backend, "resolved backend");
        Ok(backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! # crossbind
//!
//! Declarative request binding for Rust HTTP backends.
//!
//! ## Features
//!
//! - **Field descriptors**: query, header, cookie, path, form, body, JSON and
//!   file parameters with defaults, coercion, filters and validators
//! - **One request view**: a single [`RequestAdapter`](core::request::RequestAdapter)
//!   trait over axum, hyper and in-memory mock requests
//! - **Explicit backend selection**: the configured backend is resolved once
//!   through a [`BackendRegistry`](backend::BackendRegistry)
//! - **Dependency injection**: nested dependencies, cached per request
//! - **Security schemes**: API key, HTTP Basic/Bearer/Digest and OAuth2
//!   password flow
//! - **OpenAPI 3.1**: generated from the same metadata, served as JSON, YAML
//!   and through Swagger UI, ReDoc, RapiDoc or Elements
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crossbind::prelude::*;
//!
//! let config = BindConfig::from_yaml_file("crossbind.yaml")?;
//! let backend = BackendRegistry::new().from_config(&config)?;
//! let token = OAuth2PasswordBearer::builder(backend, "/api/oauth2-login")
//!     .scope("me", "Read the current user")
//!     .build()?;
//!
//! let me = Endpoint::get("/api/me")
//!     .depends("token", token.with_scopes(&["me"])?.into_depends())
//!     .param("verbose", Field::query().of_type(FieldType::Boolean).default(json!(false)))
//!     .handler(|args: Arguments| async move {
//!         let token: String = args.get("token")?;
//!         Ok(Reply::json(json!({ "token": token })))
//!     })
//!     .build()?;
//!
//! AppBuilder::new(config).endpoint(me).serve("127.0.0.1:3000").await?;
//! ```

pub mod backend;
pub mod config;
pub mod core;
pub mod openapi;
pub mod security;
pub mod server;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        depend::{Arguments, Depends, Param, Provider, Resolver, Source},
        endpoint::{Endpoint, EndpointBuilder, Handler, Reply, ReplyBody, ResponseModel, Signature},
        error::{
            BindError, BindResult, ConfigError, DependencyError, FieldValidationError,
            RequestError, ValidationError,
        },
        field::{Field, FieldFormat, FieldKind, FieldType},
        request::{RequestAdapter, UploadFile},
        validation::{filters, validate_model, validators},
    };

    // === Backends ===
    pub use crate::backend::{
        AxumBackend, AxumRequest, Backend, BackendKind, BackendRegistry, HyperBackend,
        HyperRequest, MockBackend, MockRequest,
    };

    // === Security ===
    pub use crate::security::{
        AccessToken, ApiKey, ApiKeyLocation, HttpAuthorizationCredentials, HttpBasic,
        HttpBasicCredentials, HttpBearer, HttpDigest, OAuth2PasswordBearer,
        OAuth2PasswordRequestForm, SecurityScheme,
    };

    // === OpenAPI ===
    pub use crate::openapi::{OpenApiBuilder, OpenApiDocument};

    // === Config ===
    pub use crate::config::{BindConfig, DocUi, DocsConfig, OpenApiConfig};

    // === Server ===
    pub use crate::server::{AppBuilder, HyperApp, init_tracing};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};

    // === HTTP ===
    pub use axum::Router;
    pub use http::{HeaderMap, Method, StatusCode};
}

//! Configuration loading and management

use crate::backend::BackendKind;
use crate::core::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// OpenAPI document metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiConfig {
    /// Document title (`info.title`)
    pub title: String,

    /// API version (`info.version`)
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Server URLs listed in the document
    #[serde(default)]
    pub servers: Vec<String>,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            title: "crossbind".to_string(),
            version: "0.1.0".to_string(),
            description: None,
            servers: Vec::new(),
        }
    }
}

/// Interactive documentation pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocUi {
    Swagger,
    Redoc,
    Rapidoc,
    Elements,
}

impl DocUi {
    pub fn all() -> Vec<DocUi> {
        vec![DocUi::Swagger, DocUi::Redoc, DocUi::Rapidoc, DocUi::Elements]
    }

    /// Path segment under the docs prefix
    pub fn slug(&self) -> &'static str {
        match self {
            DocUi::Swagger => "swagger",
            DocUi::Redoc => "redoc",
            DocUi::Rapidoc => "rapidoc",
            DocUi::Elements => "elements",
        }
    }
}

/// Documentation routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Mount point for `openapi.json`, `openapi.yaml` and the UI pages
    #[serde(default = "default_docs_prefix")]
    pub prefix: String,

    #[serde(default = "DocUi::all")]
    pub ui: Vec<DocUi>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_docs_prefix(),
            ui: DocUi::all(),
        }
    }
}

impl DocsConfig {
    pub fn json_path(&self) -> String {
        format!("{}/openapi.json", self.prefix.trim_end_matches('/'))
    }

    pub fn yaml_path(&self) -> String {
        format!("{}/openapi.yaml", self.prefix.trim_end_matches('/'))
    }

    pub fn ui_path(&self, ui: DocUi) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), ui.slug())
    }

    /// Reject settings the routers cannot mount
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.prefix.starts_with('/') || self.prefix.contains(['{', '}', '*']) {
            return Err(ConfigError::InvalidValue {
                field: "docs.prefix".to_string(),
                value: self.prefix.clone(),
                message: "must start with '/' and contain no captures".to_string(),
            });
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_docs_prefix() -> String {
    "/docs".to_string()
}

/// Complete configuration of a crossbind application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindConfig {
    /// The HTTP backend requests are bound from
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub openapi: OpenApiConfig,

    #[serde(default)]
    pub docs: DocsConfig,

    /// `EnvFilter` directives, `RUST_LOG` wins when set
    #[serde(default)]
    pub log_filter: Option<String>,

    /// Add a permissive CORS layer to the axum router
    #[serde(default)]
    pub cors: bool,
}

impl BindConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Create a default configuration for testing
    pub fn default_config() -> Self {
        Self {
            backend: BackendKind::Axum,
            openapi: OpenApiConfig {
                title: "crossbind example".to_string(),
                version: "1.0.0".to_string(),
                description: Some("Endpoints bound with crossbind".to_string()),
                servers: vec!["http://localhost:3000".to_string()],
            },
            docs: DocsConfig::default(),
            log_filter: Some("info,crossbind=debug".to_string()),
            cors: false,
        }
    }
}

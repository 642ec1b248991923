//! API key carried in a header, query parameter or cookie

use super::http::NOT_AUTHENTICATED;
use super::{SecurityRequirement, SecurityScheme, bind_field};
use crate::backend::Backend;
use crate::core::depend::{Arguments, Param, Provider};
use crate::core::error::{BindResult, ConfigError};
use crate::core::field::{Field, FieldKind, NotFoundHook};
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use utoipa::openapi::security::{
    ApiKey as ApiKeyObject, ApiKeyValue, SecurityScheme as SchemeObject,
};

const API_KEY_PARAM: &str = "api_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

impl ApiKeyLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyLocation::Header => "header",
            ApiKeyLocation::Query => "query",
            ApiKeyLocation::Cookie => "cookie",
        }
    }

    fn field_kind(&self) -> FieldKind {
        match self {
            ApiKeyLocation::Header => FieldKind::Header,
            ApiKeyLocation::Query => FieldKind::Query,
            ApiKeyLocation::Cookie => FieldKind::Cookie,
        }
    }

    fn default_scheme_name(&self) -> &'static str {
        match self {
            ApiKeyLocation::Header => "APIKeyHeader",
            ApiKeyLocation::Query => "APIKeyQuery",
            ApiKeyLocation::Cookie => "APIKeyCookie",
        }
    }
}

type KeyCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// API key security scheme
#[derive(Clone)]
pub struct ApiKey {
    backend: Arc<dyn Backend>,
    name: String,
    location: ApiKeyLocation,
    scheme_name: String,
    description: Option<String>,
    auto_error: bool,
    verify: Option<KeyCheck>,
    params: Vec<Param>,
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("scheme_name", &self.scheme_name)
            .field("auto_error", &self.auto_error)
            .finish()
    }
}

impl ApiKey {
    pub fn new(
        backend: Arc<dyn Backend>,
        name: impl Into<String>,
        location: ApiKeyLocation,
    ) -> Result<Self, ConfigError> {
        Self::builder(backend, name, location).build()
    }

    pub fn header(backend: Arc<dyn Backend>, name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(backend, name, ApiKeyLocation::Header)
    }

    pub fn query(backend: Arc<dyn Backend>, name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(backend, name, ApiKeyLocation::Query)
    }

    pub fn cookie(backend: Arc<dyn Backend>, name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(backend, name, ApiKeyLocation::Cookie)
    }

    pub fn builder(
        backend: Arc<dyn Backend>,
        name: impl Into<String>,
        location: ApiKeyLocation,
    ) -> ApiKeyBuilder {
        ApiKeyBuilder {
            backend,
            name: name.into(),
            location,
            field: Field::new(location.field_kind()),
            scheme_name: None,
            description: None,
            auto_error: true,
            verify: None,
        }
    }

    pub fn key_name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> ApiKeyLocation {
        self.location
    }

    /// Check the key read from the request
    pub fn check(&self, api_key: Option<&str>) -> BindResult<Option<String>> {
        let accepted = match api_key {
            Some(key) if !key.is_empty() => match &self.verify {
                Some(verify) if !verify(key) => {
                    tracing::warn!("Rejected API key for {}", self.scheme_name);
                    None
                }
                _ => Some(key.to_string()),
            },
            _ => None,
        };

        match accepted {
            Some(key) => Ok(Some(key)),
            None if self.auto_error => Err(self.backend.not_authenticated(
                StatusCode::FORBIDDEN,
                NOT_AUTHENTICATED,
                HeaderMap::new(),
            )),
            None => Ok(None),
        }
    }
}

/// Builder for [`ApiKey`]
pub struct ApiKeyBuilder {
    backend: Arc<dyn Backend>,
    name: String,
    location: ApiKeyLocation,
    field: Field,
    scheme_name: Option<String>,
    description: Option<String>,
    auto_error: bool,
    verify: Option<KeyCheck>,
}

impl ApiKeyBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.field = field;
        self
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn auto_error(mut self, auto_error: bool) -> Self {
        self.auto_error = auto_error;
        self
    }

    /// Accept only keys for which `verify` returns true
    pub fn verify<F>(mut self, verify: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.verify = Some(Arc::new(verify));
        self
    }

    pub fn build(self) -> Result<ApiKey, ConfigError> {
        let scheme_name = self
            .scheme_name
            .unwrap_or_else(|| self.location.default_scheme_name().to_string());

        let hook: Option<NotFoundHook> = if self.auto_error {
            let backend = self.backend.clone();
            Some(Arc::new(move |_: &str| {
                backend.not_authenticated(StatusCode::FORBIDDEN, NOT_AUTHENTICATED, HeaderMap::new())
            }))
        } else {
            None
        };
        let field = bind_field(
            self.field,
            &scheme_name,
            &[self.location.field_kind()],
            &self.name,
            hook,
        )?;

        Ok(ApiKey {
            backend: self.backend,
            name: self.name,
            location: self.location,
            scheme_name,
            description: self.description,
            auto_error: self.auto_error,
            verify: self.verify,
            params: vec![Param::field(API_KEY_PARAM, field)],
        })
    }
}

#[async_trait]
impl Provider for ApiKey {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    async fn provide(&self, args: Arguments) -> BindResult<Value> {
        let api_key: Option<String> = args.get(API_KEY_PARAM)?;
        Ok(serde_json::to_value(self.check(api_key.as_deref())?)?)
    }

    fn security(&self) -> Option<SecurityRequirement> {
        Some(self.requirement())
    }
}

impl SecurityScheme for ApiKey {
    fn scheme_name(&self) -> &str {
        &self.scheme_name
    }

    fn openapi_model(&self) -> SchemeObject {
        let value = match &self.description {
            Some(description) => {
                ApiKeyValue::with_description(self.name.as_str(), description.as_str())
            }
            None => ApiKeyValue::new(self.name.as_str()),
        };
        SchemeObject::ApiKey(match self.location {
            ApiKeyLocation::Header => ApiKeyObject::Header(value),
            ApiKeyLocation::Query => ApiKeyObject::Query(value),
            ApiKeyLocation::Cookie => ApiKeyObject::Cookie(value),
        })
    }
}

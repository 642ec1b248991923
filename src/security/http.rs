//! HTTP authentication schemes: Basic, Bearer and Digest

use super::{SecurityRequirement, SecurityScheme, bind_field, get_authorization_scheme_param};
use crate::backend::Backend;
use crate::core::depend::{Arguments, Param, Provider};
use crate::core::error::{BindError, BindResult, ConfigError};
use crate::core::field::{Field, FieldKind, NotFoundHook};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use utoipa::openapi::security::{
    HttpAuthScheme, HttpBuilder, SecurityScheme as SchemeObject,
};

pub(crate) const NOT_AUTHENTICATED: &str = "Not authenticated";
pub(crate) const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

const AUTHORIZATION: &str = "Authorization";
const AUTHORIZATION_PARAM: &str = "authorization";

/// Why a Basic credential could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    #[error("credentials are not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("credentials are not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("credentials have no ':' separator")]
    MissingSeparator,
}

/// Username and password sent with HTTP Basic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBasicCredentials {
    pub username: String,
    pub password: String,
}

impl HttpBasicCredentials {
    /// Decode the base64 `user:password` part of a Basic authorization
    pub fn decode(param: &str) -> Result<Self, CredentialsError> {
        let bytes = STANDARD.decode(param.trim())?;
        let decoded = String::from_utf8(bytes)?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or(CredentialsError::MissingSeparator)?;
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Scheme and credentials of an `Authorization` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpAuthorizationCredentials {
    pub scheme: String,
    pub credentials: String,
}

/// Builder shared by the three HTTP schemes
pub struct HttpSchemeBuilder<S> {
    backend: Arc<dyn Backend>,
    field: Field,
    scheme_name: Option<String>,
    description: Option<String>,
    auto_error: bool,
    realm: Option<String>,
    bearer_format: Option<String>,
    _scheme: PhantomData<S>,
}

impl<S> HttpSchemeBuilder<S> {
    fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            field: Field::header(),
            scheme_name: None,
            description: None,
            auto_error: true,
            realm: None,
            bearer_format: None,
            _scheme: PhantomData,
        }
    }

    /// Read the credentials from `field` instead of a fresh header field
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

    /// With `false`, a missing header resolves to `None` instead of failing
    pub fn auto_error(mut self, auto_error: bool) -> Self {
        self.auto_error = auto_error;
        self
    }

    fn hook(&self, status: StatusCode, headers: HeaderMap) -> Option<NotFoundHook> {
        if !self.auto_error {
            return None;
        }
        let backend = self.backend.clone();
        Some(Arc::new(move |_: &str| {
            backend.not_authenticated(status, NOT_AUTHENTICATED, headers.clone())
        }))
    }
}

// =============================================================================
// Basic
// =============================================================================

/// HTTP Basic authentication
#[derive(Debug, Clone)]
pub struct HttpBasic {
    backend: Arc<dyn Backend>,
    scheme_name: String,
    description: Option<String>,
    realm: Option<String>,
    auto_error: bool,
    params: Vec<Param>,
}

impl HttpBasic {
    pub fn new(backend: Arc<dyn Backend>) -> Result<Self, ConfigError> {
        Self::builder(backend).build()
    }

    pub fn builder(backend: Arc<dyn Backend>) -> HttpSchemeBuilder<HttpBasic> {
        HttpSchemeBuilder::new(backend)
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// Turn the raw `Authorization` value into credentials
    pub fn authorization_handler(
        &self,
        authorization: Option<&str>,
    ) -> BindResult<Option<HttpBasicCredentials>> {
        let (scheme, param) = get_authorization_scheme_param(authorization);
        if authorization.is_none() || !scheme.eq_ignore_ascii_case("basic") {
            return if self.auto_error {
                Err(self.unauthorized(NOT_AUTHENTICATED))
            } else {
                Ok(None)
            };
        }

        HttpBasicCredentials::decode(param).map(Some).map_err(|e| {
            tracing::warn!("Rejected Basic credentials: {}", e);
            self.unauthorized(INVALID_CREDENTIALS)
        })
    }

    fn unauthorized(&self, message: &str) -> BindError {
        let challenge = basic_challenge(self.realm.as_deref());
        self.backend
            .not_authenticated(StatusCode::UNAUTHORIZED, message, challenge)
    }
}

impl HttpSchemeBuilder<HttpBasic> {
    /// Realm announced in `WWW-Authenticate`
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn build(self) -> Result<HttpBasic, ConfigError> {
        let scheme_name = self.scheme_name.clone().unwrap_or_else(|| "HTTPBasic".to_string());
        let hook = self.hook(
            StatusCode::UNAUTHORIZED,
            basic_challenge(self.realm.as_deref()),
        );
        let field = bind_field(
            self.field,
            &scheme_name,
            &[FieldKind::Header],
            AUTHORIZATION,
            hook,
        )?;
        Ok(HttpBasic {
            backend: self.backend,
            scheme_name,
            description: self.description,
            realm: self.realm,
            auto_error: self.auto_error,
            params: vec![Param::field(AUTHORIZATION_PARAM, field)],
        })
    }
}

fn basic_challenge(realm: Option<&str>) -> HeaderMap {
    let value = match realm {
        Some(realm) => format!("Basic realm=\"{}\"", realm),
        None => "Basic".to_string(),
    };
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(WWW_AUTHENTICATE, value);
    }
    headers
}

#[async_trait]
impl Provider for HttpBasic {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    async fn provide(&self, args: Arguments) -> BindResult<Value> {
        let authorization: Option<String> = args.get(AUTHORIZATION_PARAM)?;
        let credentials = self.authorization_handler(authorization.as_deref())?;
        Ok(serde_json::to_value(credentials)?)
    }

    fn security(&self) -> Option<SecurityRequirement> {
        Some(self.requirement())
    }
}

impl SecurityScheme for HttpBasic {
    fn scheme_name(&self) -> &str {
        &self.scheme_name
    }

    fn openapi_model(&self) -> SchemeObject {
        SchemeObject::Http(
            HttpBuilder::new()
                .scheme(HttpAuthScheme::Basic)
                .description(self.description.clone())
                .build(),
        )
    }
}

// =============================================================================
// Bearer and Digest
// =============================================================================

/// Shared behaviour of schemes that hand back the raw credentials
#[derive(Debug, Clone)]
struct AuthorizationScheme {
    backend: Arc<dyn Backend>,
    keyword: &'static str,
    auth_scheme: HttpAuthScheme,
    scheme_name: String,
    description: Option<String>,
    bearer_format: Option<String>,
    auto_error: bool,
    params: Vec<Param>,
}

impl AuthorizationScheme {
    fn build<S>(
        builder: HttpSchemeBuilder<S>,
        keyword: &'static str,
        auth_scheme: HttpAuthScheme,
        default_name: &str,
    ) -> Result<Self, ConfigError> {
        let scheme_name = builder
            .scheme_name
            .clone()
            .unwrap_or_else(|| default_name.to_string());
        let hook = builder.hook(StatusCode::FORBIDDEN, HeaderMap::new());
        let field = bind_field(
            builder.field,
            &scheme_name,
            &[FieldKind::Header],
            AUTHORIZATION,
            hook,
        )?;
        Ok(Self {
            backend: builder.backend,
            keyword,
            auth_scheme,
            scheme_name,
            description: builder.description,
            bearer_format: builder.bearer_format,
            auto_error: builder.auto_error,
            params: vec![Param::field(AUTHORIZATION_PARAM, field)],
        })
    }

    fn authorization_handler(
        &self,
        authorization: Option<&str>,
    ) -> BindResult<Option<HttpAuthorizationCredentials>> {
        let (scheme, credentials) = get_authorization_scheme_param(authorization);
        if scheme.is_empty() || credentials.is_empty() {
            return self.reject(NOT_AUTHENTICATED);
        }
        if !scheme.eq_ignore_ascii_case(self.keyword) {
            tracing::warn!("Rejected '{}' authorization for {}", scheme, self.scheme_name);
            return self.reject(INVALID_CREDENTIALS);
        }
        Ok(Some(HttpAuthorizationCredentials {
            scheme: scheme.to_string(),
            credentials: credentials.to_string(),
        }))
    }

    fn reject<T>(&self, message: &str) -> BindResult<Option<T>> {
        if self.auto_error {
            Err(self
                .backend
                .not_authenticated(StatusCode::FORBIDDEN, message, HeaderMap::new()))
        } else {
            Ok(None)
        }
    }

    async fn provide(&self, args: Arguments) -> BindResult<Value> {
        let authorization: Option<String> = args.get(AUTHORIZATION_PARAM)?;
        let credentials = self.authorization_handler(authorization.as_deref())?;
        Ok(serde_json::to_value(credentials)?)
    }

    fn openapi_model(&self) -> SchemeObject {
        let mut http = HttpBuilder::new()
            .scheme(self.auth_scheme.clone())
            .description(self.description.clone());
        if let Some(format) = &self.bearer_format {
            http = http.bearer_format(format.as_str());
        }
        SchemeObject::Http(http.build())
    }
}

macro_rules! authorization_scheme {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: AuthorizationScheme,
        }

        impl $name {
            pub fn new(backend: Arc<dyn Backend>) -> Result<Self, ConfigError> {
                Self::builder(backend).build()
            }

            pub fn builder(backend: Arc<dyn Backend>) -> HttpSchemeBuilder<$name> {
                HttpSchemeBuilder::new(backend)
            }

            /// Split the raw `Authorization` value into scheme and credentials
            pub fn authorization_handler(
                &self,
                authorization: Option<&str>,
            ) -> BindResult<Option<HttpAuthorizationCredentials>> {
                self.inner.authorization_handler(authorization)
            }
        }

        #[async_trait]
        impl Provider for $name {
            fn name(&self) -> &str {
                &self.inner.scheme_name
            }

            fn params(&self) -> &[Param] {
                &self.inner.params
            }

            async fn provide(&self, args: Arguments) -> BindResult<Value> {
                self.inner.provide(args).await
            }

            fn security(&self) -> Option<SecurityRequirement> {
                Some(self.requirement())
            }
        }

        impl SecurityScheme for $name {
            fn scheme_name(&self) -> &str {
                &self.inner.scheme_name
            }

            fn openapi_model(&self) -> SchemeObject {
                self.inner.openapi_model()
            }
        }
    };
}

authorization_scheme!(
    /// HTTP Bearer authentication
    HttpBearer
);

authorization_scheme!(
    /// HTTP Digest authentication; the digest itself is not verified
    HttpDigest
);

impl HttpSchemeBuilder<HttpBearer> {
    /// Hint such as `JWT` shown in the documentation
    pub fn bearer_format(mut self, format: impl Into<String>) -> Self {
        self.bearer_format = Some(format.into());
        self
    }

    pub fn build(self) -> Result<HttpBearer, ConfigError> {
        Ok(HttpBearer {
            inner: AuthorizationScheme::build(self, "bearer", HttpAuthScheme::Bearer, "HTTPBearer")?,
        })
    }
}

impl HttpSchemeBuilder<HttpDigest> {
    pub fn build(self) -> Result<HttpDigest, ConfigError> {
        Ok(HttpDigest {
            inner: AuthorizationScheme::build(self, "digest", HttpAuthScheme::Digest, "HTTPDigest")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AxumBackend, MockRequest};
    use crate::core::depend::Resolver;
    use crate::core::error::RequestError;

    fn backend() -> Arc<dyn Backend> {
        Arc::new(AxumBackend)
    }

    fn auth_failure(err: BindError) -> (StatusCode, String, HeaderMap) {
        match err {
            BindError::Request(RequestError::NotAuthenticated {
                status,
                message,
                headers,
            }) => (status, message, headers),
            other => panic!("Expected NotAuthenticated, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_basic_credentials() {
        let credentials = HttpBasicCredentials::decode("am9objpzZWNyZXQ6eA==").unwrap();
        assert_eq!(credentials.username, "john");
        assert_eq!(credentials.password, "secret:x");
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            HttpBasicCredentials::decode("%%%"),
            Err(CredentialsError::Base64(_))
        ));
        // "/w==" is the single byte 0xff
        assert!(matches!(
            HttpBasicCredentials::decode("/w=="),
            Err(CredentialsError::Utf8(_))
        ));
        // "am9obg==" is "john"
        assert_eq!(
            HttpBasicCredentials::decode("am9obg=="),
            Err(CredentialsError::MissingSeparator)
        );
    }

    #[test]
    fn test_basic_missing_or_wrong_scheme() {
        let basic = HttpBasic::builder(backend()).realm("api").build().unwrap();
        for value in [None, Some("Bearer abc")] {
            let (status, message, headers) =
                auth_failure(basic.authorization_handler(value).unwrap_err());
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(message, NOT_AUTHENTICATED);
            assert_eq!(headers[WWW_AUTHENTICATE], "Basic realm=\"api\"");
        }
    }

    #[test]
    fn test_basic_invalid_credentials() {
        let basic = HttpBasic::new(backend()).unwrap();
        let (status, message, headers) =
            auth_failure(basic.authorization_handler(Some("Basic am9obg==")).unwrap_err());
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, INVALID_CREDENTIALS);
        assert_eq!(headers[WWW_AUTHENTICATE], "Basic");
    }

    #[test]
    fn test_basic_without_auto_error() {
        let basic = HttpBasic::builder(backend()).auto_error(false).build().unwrap();
        assert_eq!(basic.authorization_handler(None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_basic_as_dependency() {
        let basic = HttpBasic::new(backend()).unwrap().into_depends();
        let req = MockRequest::builder()
            .header("authorization", "Basic am9objpzZWNyZXQ=")
            .build();
        let args = Resolver::new(&req)
            .resolve(&[Param::depends("credentials", basic)])
            .await
            .unwrap();
        let credentials: HttpBasicCredentials = args.get("credentials").unwrap();
        assert_eq!(credentials.username, "john");
        assert_eq!(credentials.password, "secret");
    }

    #[tokio::test]
    async fn test_missing_header_uses_hook() {
        let basic = HttpBasic::new(backend()).unwrap().into_depends();
        let req = MockRequest::builder().build();
        let err = Resolver::new(&req)
            .resolve(&[Param::depends("credentials", basic)])
            .await
            .unwrap_err();
        let (status, message, _) = auth_failure(err);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, NOT_AUTHENTICATED);
    }

    #[test]
    fn test_bearer() {
        let bearer = HttpBearer::new(backend()).unwrap();
        let credentials = bearer
            .authorization_handler(Some("Bearer token123"))
            .unwrap()
            .unwrap();
        assert_eq!(credentials.scheme, "Bearer");
        assert_eq!(credentials.credentials, "token123");

        let (status, message, _) = auth_failure(bearer.authorization_handler(None).unwrap_err());
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, NOT_AUTHENTICATED);

        let (status, message, _) =
            auth_failure(bearer.authorization_handler(Some("Basic abc")).unwrap_err());
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(message, INVALID_CREDENTIALS);
    }

    #[test]
    fn test_bearer_without_auto_error() {
        let bearer = HttpBearer::builder(backend()).auto_error(false).build().unwrap();
        assert_eq!(bearer.authorization_handler(None).unwrap(), None);
        assert_eq!(bearer.authorization_handler(Some("Basic abc")).unwrap(), None);
    }

    #[test]
    fn test_digest() {
        let digest = HttpDigest::new(backend()).unwrap();
        let credentials = digest
            .authorization_handler(Some("Digest username=\"a\", nonce=\"b\""))
            .unwrap()
            .unwrap();
        assert_eq!(credentials.scheme, "Digest");
        assert!(digest.authorization_handler(Some("Bearer x")).is_err());
    }

    #[test]
    fn test_openapi_models() {
        let bearer = HttpBearer::builder(backend())
            .bearer_format("JWT")
            .build()
            .unwrap();
        assert_eq!(
            serde_json::to_value(bearer.openapi_model()).unwrap(),
            serde_json::json!({ "type": "http", "scheme": "bearer", "bearerFormat": "JWT" })
        );
        assert_eq!(
            serde_json::to_value(HttpDigest::new(backend()).unwrap().openapi_model()).unwrap(),
            serde_json::json!({ "type": "http", "scheme": "digest" })
        );
        assert_eq!(HttpBasic::new(backend()).unwrap().scheme_name(), "HTTPBasic");
        assert_eq!(HttpDigest::new(backend()).unwrap().scheme_name(), "HTTPDigest");
    }

    #[test]
    fn test_field_already_aliased() {
        let result = HttpBearer::builder(backend())
            .field(Field::header().alias("X-Auth"))
            .build();
        assert!(matches!(result, Err(ConfigError::AliasAlreadyBound { .. })));
    }
}

//! OAuth2 password flow
//!
//! [`OAuth2PasswordBearer`] reads the bearer token issued by the token
//! endpoint. [`OAuth2PasswordRequestForm`] is the form that endpoint
//! receives.

use super::http::NOT_AUTHENTICATED;
use super::{SecurityRequirement, SecurityScheme, bind_field, get_authorization_scheme_param};
use crate::backend::Backend;
use crate::core::depend::{Arguments, Depends, Param, Provider};
use crate::core::error::{BindResult, ConfigError};
use crate::core::field::{Field, FieldKind, NotFoundHook};
use crate::core::validation::validators;
use async_trait::async_trait;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderMap, HeaderValue, StatusCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::openapi::security::{
    Flow, OAuth2, Password, Scopes, SecurityScheme as SchemeObject,
};
use std::sync::Arc;

const AUTHORIZATION_PARAM: &str = "authorization";

/// Token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

impl AccessToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "bearer".to_string(),
        }
    }
}

/// OAuth2 password flow bearer token
#[derive(Debug, Clone)]
pub struct OAuth2PasswordBearer {
    backend: Arc<dyn Backend>,
    token_url: String,
    scheme_name: String,
    scopes: IndexMap<String, String>,
    description: Option<String>,
    auto_error: bool,
    required_scopes: Vec<String>,
    params: Vec<Param>,
}

impl OAuth2PasswordBearer {
    pub fn new(backend: Arc<dyn Backend>, token_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::builder(backend, token_url).build()
    }

    pub fn builder(
        backend: Arc<dyn Backend>,
        token_url: impl Into<String>,
    ) -> OAuth2PasswordBearerBuilder {
        OAuth2PasswordBearerBuilder {
            backend,
            token_url: token_url.into(),
            field: Field::header(),
            scheme_name: None,
            scopes: IndexMap::new(),
            description: None,
            auto_error: true,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Scopes the scheme knows about, with their descriptions
    pub fn scopes(&self) -> &IndexMap<String, String> {
        &self.scopes
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.required_scopes
    }

    /// A copy of this scheme that requires `required` on top of the scopes
    /// already required
    pub fn with_scopes(&self, required: &[&str]) -> Result<Self, ConfigError> {
        let mut derived = self.clone();
        for scope in required {
            if !self.scopes.contains_key(*scope) {
                return Err(ConfigError::InvalidValue {
                    field: "scopes".to_string(),
                    value: scope.to_string(),
                    message: format!("unknown scope for {}", self.scheme_name),
                });
            }
            if !derived.required_scopes.iter().any(|s| s == scope) {
                derived.required_scopes.push(scope.to_string());
            }
        }
        Ok(derived)
    }

    /// Whether `granted` covers every required scope
    pub fn is_allow<S: AsRef<str>>(&self, granted: &[S]) -> bool {
        self.required_scopes
            .iter()
            .all(|required| granted.iter().any(|g| g.as_ref() == required))
    }

    /// Extract the bearer token from the raw `Authorization` value
    pub fn token_handler(&self, authorization: Option<&str>) -> BindResult<Option<String>> {
        let (scheme, token) = get_authorization_scheme_param(authorization);
        if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
            return Ok(Some(token.to_string()));
        }
        if self.auto_error {
            Err(self
                .backend
                .not_authenticated(StatusCode::UNAUTHORIZED, NOT_AUTHENTICATED, bearer_challenge()))
        } else {
            Ok(None)
        }
    }
}

fn bearer_challenge() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    headers
}

/// Builder for [`OAuth2PasswordBearer`]
pub struct OAuth2PasswordBearerBuilder {
    backend: Arc<dyn Backend>,
    token_url: String,
    field: Field,
    scheme_name: Option<String>,
    scopes: IndexMap<String, String>,
    description: Option<String>,
    auto_error: bool,
}

impl OAuth2PasswordBearerBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.field = field;
        self
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = Some(name.into());
        self
    }

    pub fn scope(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.scopes.insert(name.into(), description.into());
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

    pub fn build(self) -> Result<OAuth2PasswordBearer, ConfigError> {
        let scheme_name = self
            .scheme_name
            .unwrap_or_else(|| "OAuth2PasswordBearer".to_string());

        let hook: Option<NotFoundHook> = if self.auto_error {
            let backend = self.backend.clone();
            Some(Arc::new(move |_: &str| {
                backend.not_authenticated(
                    StatusCode::UNAUTHORIZED,
                    NOT_AUTHENTICATED,
                    bearer_challenge(),
                )
            }))
        } else {
            None
        };
        let field = bind_field(
            self.field,
            &scheme_name,
            &[FieldKind::Header],
            "Authorization",
            hook,
        )?;

        Ok(OAuth2PasswordBearer {
            backend: self.backend,
            token_url: self.token_url,
            scheme_name,
            scopes: self.scopes,
            description: self.description,
            auto_error: self.auto_error,
            required_scopes: Vec::new(),
            params: vec![Param::field(AUTHORIZATION_PARAM, field)],
        })
    }
}

#[async_trait]
impl Provider for OAuth2PasswordBearer {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    async fn provide(&self, args: Arguments) -> BindResult<Value> {
        let authorization: Option<String> = args.get(AUTHORIZATION_PARAM)?;
        Ok(serde_json::to_value(
            self.token_handler(authorization.as_deref())?,
        )?)
    }

    fn security(&self) -> Option<SecurityRequirement> {
        Some(self.requirement())
    }
}

impl SecurityScheme for OAuth2PasswordBearer {
    fn scheme_name(&self) -> &str {
        &self.scheme_name
    }

    fn openapi_model(&self) -> SchemeObject {
        let scopes = Scopes::from_iter(
            self.scopes
                .iter()
                .map(|(name, description)| (name.as_str(), description.as_str())),
        );
        let flows = [Flow::Password(Password::new(self.token_url.as_str(), scopes))];
        SchemeObject::OAuth2(match &self.description {
            Some(description) => OAuth2::with_description(flows, description.as_str()),
            None => OAuth2::new(flows),
        })
    }

    fn requirement_scopes(&self) -> Vec<String> {
        self.required_scopes.clone()
    }
}

// =============================================================================
// Password request form
// =============================================================================

/// Form posted to the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2PasswordRequestForm {
    pub grant_type: String,
    pub username: String,
    pub password: String,
    /// The `scope` field split on whitespace
    pub scopes: Vec<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl OAuth2PasswordRequestForm {
    /// Dependency reading the form; `grant_type` must be `password`
    pub fn depends() -> Depends {
        Depends::new(Arc::new(PasswordFormProvider::new()))
    }

    /// Read the form resolved under `name`
    pub fn from_arguments(args: &Arguments, name: &str) -> BindResult<Self> {
        args.get(name)
    }
}

struct PasswordFormProvider {
    params: Vec<Param>,
}

impl PasswordFormProvider {
    fn new() -> Self {
        Self {
            params: vec![
                Param::field(
                    "grant_type",
                    Field::form()
                        .validator(validators::in_list(vec!["password".to_string()]))
                        .example(json!("password")),
                ),
                Param::field("username", Field::form()),
                Param::field("password", Field::form()),
                Param::field("scope", Field::form().default(json!(""))),
                Param::field("client_id", Field::form().default(Value::Null)),
                Param::field("client_secret", Field::form().default(Value::Null)),
            ],
        }
    }
}

#[async_trait]
impl Provider for PasswordFormProvider {
    fn name(&self) -> &str {
        "OAuth2PasswordRequestForm"
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    async fn provide(&self, args: Arguments) -> BindResult<Value> {
        let scope: String = args.get("scope")?;
        let form = OAuth2PasswordRequestForm {
            grant_type: args.get("grant_type")?,
            username: args.get("username")?,
            password: args.get("password")?,
            scopes: scope.split_whitespace().map(str::to_string).collect(),
            client_id: args.get("client_id")?,
            client_secret: args.get("client_secret")?,
        };
        Ok(serde_json::to_value(form)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AxumBackend, MockRequest};
    use crate::core::depend::Resolver;
    use crate::core::error::{BindError, RequestError, ValidationError};

    fn scheme() -> OAuth2PasswordBearer {
        OAuth2PasswordBearer::builder(Arc::new(AxumBackend), "/api/oauth2-login")
            .scope("me", "Read information about the current user")
            .scope("items", "Read items")
            .build()
            .unwrap()
    }

    #[test]
    fn test_is_allow_superset_rule() {
        let guarded = scheme().with_scopes(&["me", "items"]).unwrap();
        assert!(guarded.is_allow(&["items", "me", "extra"]));
        assert!(guarded.is_allow(&["me", "items"]));
        assert!(!guarded.is_allow(&["me"]));
        assert!(!guarded.is_allow::<&str>(&[]));

        // No required scopes accepts anything
        assert!(scheme().is_allow::<&str>(&[]));
    }

    #[test]
    fn test_with_scopes_derives_new_instance() {
        let base = scheme();
        let derived = base.with_scopes(&["me"]).unwrap();
        assert!(base.required_scopes().is_empty());
        assert_eq!(derived.required_scopes(), ["me".to_string()]);
        assert_eq!(derived.requirement().scopes, vec!["me".to_string()]);

        let err = base.with_scopes(&["admin"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_token_handler() {
        let scheme = scheme();
        assert_eq!(
            scheme.token_handler(Some("Bearer abc")).unwrap(),
            Some("abc".to_string())
        );
        match scheme.token_handler(Some("Basic abc")).unwrap_err() {
            BindError::Request(RequestError::NotAuthenticated { status, headers, .. }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(headers[WWW_AUTHENTICATE], "Bearer");
            }
            other => panic!("Expected NotAuthenticated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_password_form() {
        let req = MockRequest::builder()
            .form("grant_type", "password")
            .form("username", "alice")
            .form("password", "wonderland")
            .form("scope", "me  items")
            .build();
        let args = Resolver::new(&req)
            .resolve(&[Param::depends("form", OAuth2PasswordRequestForm::depends())])
            .await
            .unwrap();
        let form = OAuth2PasswordRequestForm::from_arguments(&args, "form").unwrap();
        assert_eq!(form.username, "alice");
        assert_eq!(form.scopes, vec!["me", "items"]);
        assert_eq!(form.client_id, None);
    }

    #[tokio::test]
    async fn test_password_form_rejects_grant_type() {
        let req = MockRequest::builder()
            .form("grant_type", "client_credentials")
            .form("username", "alice")
            .build();
        let err = Resolver::new(&req)
            .resolve(&[Param::depends("form", OAuth2PasswordRequestForm::depends())])
            .await
            .unwrap_err();
        match err {
            BindError::Validation(ValidationError::FieldErrors(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["grant_type", "password"]);
            }
            other => panic!("Expected FieldErrors, got {:?}", other),
        }
    }

    #[test]
    fn test_openapi_model() {
        let value = serde_json::to_value(scheme().openapi_model()).unwrap();
        assert_eq!(value["type"], "oauth2");
        assert_eq!(value["flows"]["password"]["tokenUrl"], "/api/oauth2-login");
        assert_eq!(
            value["flows"]["password"]["scopes"]["me"],
            "Read information about the current user"
        );
    }

    #[test]
    fn test_access_token() {
        let token = AccessToken::bearer("t0k3n");
        assert_eq!(
            serde_json::to_value(token).unwrap(),
            json!({ "access_token": "t0k3n", "token_type": "bearer" })
        );
    }
}

//! Security schemes
//!
//! Each scheme reads one authorization field (a header, query parameter or
//! cookie), turns it into credentials, and is used as a dependency:
//!
//! ```rust,ignore
//! let backend = BackendRegistry::new().from_config(&config)?;
//! let basic = HttpBasic::new(backend.clone())?;
//!
//! let endpoint = Endpoint::get("/me")
//!     .depends("credentials", basic.into_depends())
//!     .handler(|args: Arguments| async move { ... })
//!     .build()?;
//! ```
//!
//! Binding the field sets its alias and missing-value hook. A field that
//! already carries either is rejected with a [`ConfigError`].

pub mod api_key;
pub mod http;
pub mod oauth2;
pub mod util;

pub use api_key::{ApiKey, ApiKeyLocation};
pub use self::http::{
    CredentialsError, HttpAuthorizationCredentials, HttpBasic, HttpBasicCredentials, HttpBearer,
    HttpDigest,
};
pub use oauth2::{AccessToken, OAuth2PasswordBearer, OAuth2PasswordRequestForm};
pub use util::get_authorization_scheme_param;

use crate::core::depend::{Depends, Provider};
use crate::core::error::ConfigError;
use crate::core::field::{Field, FieldKind, NotFoundHook};
use std::sync::Arc;
use utoipa::openapi::security::SecurityScheme as SchemeObject;

/// A requirement an operation places on one security scheme
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityRequirement {
    pub name: String,
    pub scopes: Vec<String>,
    pub scheme: SchemeObject,
}

/// Common surface of every security scheme
pub trait SecurityScheme: Provider + Sized + 'static {
    /// Key under `components.securitySchemes`
    fn scheme_name(&self) -> &str;

    /// The `components.securitySchemes` entry
    fn openapi_model(&self) -> SchemeObject;

    /// Scopes an operation using this scheme requires
    fn requirement_scopes(&self) -> Vec<String> {
        Vec::new()
    }

    fn requirement(&self) -> SecurityRequirement {
        SecurityRequirement {
            name: self.scheme_name().to_string(),
            scopes: self.requirement_scopes(),
            scheme: self.openapi_model(),
        }
    }

    fn into_depends(self) -> Depends {
        Depends::new(Arc::new(self))
    }
}

/// Bind a scheme's authorization field
///
/// With `hook` the field raises the scheme's error when absent; without it
/// (schemes with `auto_error` off) an absent field resolves to `null`.
pub(crate) fn bind_field(
    mut field: Field,
    scheme: &str,
    allowed: &[FieldKind],
    alias: &str,
    hook: Option<NotFoundHook>,
) -> Result<Field, ConfigError> {
    if !allowed.contains(&field.kind()) {
        return Err(ConfigError::UnsupportedLocation {
            scheme: scheme.to_string(),
            location: field.kind().to_string(),
        });
    }
    field.bind_alias(alias)?;
    match hook {
        Some(hook) => field.bind_not_found(hook)?,
        None => {
            if field.has_not_found_hook() {
                return Err(ConfigError::NotFoundHookAlreadyBound);
            }
            field.set_default(serde_json::Value::Null);
        }
    }
    Ok(field)
}

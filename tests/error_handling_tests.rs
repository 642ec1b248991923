//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Errors map to the right HTTP status codes and error codes
//! - Backends render the same error differently
//! - Conversions from external errors land in the right variant

use axum::response::IntoResponse;
use crossbind::prelude::*;
use http_body_util::BodyExt;

fn field_errors() -> BindError {
    BindError::Validation(ValidationError::FieldErrors(vec![
        FieldValidationError::new("limit", "query", "value is not a valid integer"),
        FieldValidationError::new("x-token", "header", "field required"),
    ]))
}

// =============================================================================
// HTTP Status Code Tests
// =============================================================================

mod status_code_tests {
    use super::*;

    #[test]
    fn test_validation_error_returns_422() {
        assert_eq!(field_errors().status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_not_authenticated_keeps_its_status() {
        let err = BindError::not_authenticated(
            StatusCode::FORBIDDEN,
            "Not authenticated",
            HeaderMap::new(),
        );
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.error_code(), "NOT_AUTHENTICATED");
    }

    #[test]
    fn test_request_errors() {
        let err = BindError::Request(RequestError::UnsupportedMediaType {
            expected: "application/json".to_string(),
            actual: Some("text/plain".to_string()),
        });
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let err = BindError::Request(RequestError::MethodNotAllowed {
            method: "PUT".to_string(),
            path: "/items".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_dependency_and_config_errors_return_500() {
        let err = BindError::Dependency(DependencyError::TooDeep {
            name: "db".to_string(),
            depth: 33,
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "DEPENDENCY_TOO_DEEP");

        let err = BindError::Config(ConfigError::NotFoundHookAlreadyBound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}

// =============================================================================
// Error Response Tests
// =============================================================================

mod response_tests {
    use super::*;

    #[test]
    fn test_validation_response_lists_fields() {
        let response = field_errors().to_response();
        assert_eq!(response.code, "VALIDATION_ERROR");
        let details = response.details.unwrap();
        assert_eq!(details["fields"][0]["field"], "limit");
        assert_eq!(details["fields"][1]["location"], "header");
    }

    #[test]
    fn test_not_authenticated_message_is_bare() {
        let err = BindError::not_authenticated(
            StatusCode::UNAUTHORIZED,
            "Not authenticated",
            HeaderMap::new(),
        );
        assert_eq!(err.to_response().message, "Not authenticated");
        assert!(err.to_response().details.is_none());
    }

    #[tokio::test]
    async fn test_into_response_carries_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("www-authenticate", "Bearer".parse().unwrap());
        let err = BindError::not_authenticated(StatusCode::UNAUTHORIZED, "Not authenticated", headers);

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "NOT_AUTHENTICATED");
    }

    #[tokio::test]
    async fn test_backends_render_differently() {
        let axum = AxumBackend.render_error(&field_errors());
        assert_eq!(axum.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(axum.headers()["content-type"], "application/json");

        let hyper = HyperBackend.render_error(&field_errors());
        assert_eq!(hyper.status(), StatusCode::BAD_REQUEST);
        assert!(
            hyper.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        let body = hyper.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("limit"));
    }
}

// =============================================================================
// Error Conversion Tests
// =============================================================================

mod error_conversion_tests {
    use super::*;

    #[test]
    fn test_serde_json_error_converts_to_invalid_json() {
        let json_err = serde_json::from_str::<Value>("invalid").unwrap_err();
        let err: BindError = json_err.into();
        assert!(matches!(
            err,
            BindError::Validation(ValidationError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_config_error_converts() {
        let err: BindError = ConfigError::UnknownBackend {
            name: "warp".to_string(),
        }
        .into();
        assert!(matches!(err, BindError::Config(ConfigError::UnknownBackend { .. })));
        assert!(err.to_string().contains("warp"));
    }

    #[test]
    fn test_anyhow_error_unwraps_bind_error() {
        let original: anyhow::Error = BindError::Request(RequestError::Forbidden {
            message: "nope".to_string(),
        })
        .into();
        let err: BindError = original.into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err: BindError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, BindError::Internal(_)));
    }

    #[test]
    fn test_unknown_backend_name() {
        let err = "warp".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend { name } if name == "warp"));
    }
}

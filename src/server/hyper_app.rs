//! Serve endpoints from a plain hyper / tower stack
//!
//! [`HyperApp`] is a `tower::Service<http::Request<B>>`. Wrap it with
//! `hyper_util::service::TowerToHyperService` to hand it to hyper, or call it
//! directly with `tower::ServiceExt::oneshot` in tests.

use super::builder::{check_routes, document_for};
use super::docs::DocsPages;
use crate::backend::{Backend, BackendKind, BackendRegistry, HyperRequest};
use crate::config::BindConfig;
use crate::core::endpoint::{Endpoint, Signature};
use crate::core::error::{BindError, ConfigError, RequestError};
use anyhow::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, Response};
use http_body_util::Full;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Tower service routing requests to endpoints by method and path template
///
/// When templates overlap, static segments win over captures, matching the
/// axum router.
#[derive(Debug, Clone)]
pub struct HyperApp {
    backend: Arc<dyn Backend>,
    endpoints: Arc<Vec<Endpoint>>,
    /// Indices into `endpoints`, most specific template first
    routing: Arc<Vec<usize>>,
    docs: Option<Arc<DocsPages>>,
}

/// Builder for [`HyperApp`]
pub struct HyperAppBuilder {
    config: BindConfig,
    registry: BackendRegistry,
    endpoints: Vec<Endpoint>,
}

impl HyperApp {
    pub fn builder(config: BindConfig) -> HyperAppBuilder {
        HyperAppBuilder {
            config,
            registry: BackendRegistry::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn signatures(&self) -> Vec<Signature> {
        self.endpoints.iter().map(Endpoint::signature).collect()
    }

    /// Route one request
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: http_body::Body,
        B::Error: Into<BoxError>,
    {
        let path = request.uri().path().to_string();
        if let Some(docs) = &self.docs {
            if let Some(response) = docs.respond(request.method(), &path) {
                return response;
            }
        }

        let matched = self.routing.iter().find_map(|&index| {
            let endpoint = &self.endpoints[index];
            endpoint
                .template()
                .matches(&path)
                .map(|captures| (endpoint.path(), captures))
        });
        let Some((template, captures)) = matched else {
            return self
                .backend
                .render_error(&RequestError::NotFound { path }.into());
        };

        let endpoint = self
            .endpoints
            .iter()
            .find(|e| e.path() == template && e.method() == request.method());
        let Some(endpoint) = endpoint else {
            let err: BindError = RequestError::MethodNotAllowed {
                method: request.method().to_string(),
                path,
            }
            .into();
            return self.backend.render_error(&err);
        };

        let params = match captures {
            Ok(params) => params,
            Err(err) => return self.backend.render_error(&err.into()),
        };
        tracing::debug!("{} {} -> {}", request.method(), path, endpoint.operation_id());
        match HyperRequest::from_request(request, params).await {
            Ok(adapted) => endpoint.respond(&adapted, self.backend.as_ref()).await,
            Err(err) => self.backend.render_error(&err),
        }
    }
}

impl HyperAppBuilder {
    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn route(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn routes(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints.extend(endpoints);
        self
    }

    pub fn build(self) -> Result<HyperApp> {
        let backend = self.registry.from_config(&self.config)?;
        if backend.kind() == BackendKind::Axum {
            return Err(ConfigError::InvalidValue {
                field: "backend".to_string(),
                value: backend.kind().to_string(),
                message: "HyperApp serves hyper requests, use AppBuilder for axum".to_string(),
            }
            .into());
        }

        let docs = if self.config.docs.enabled {
            let document = document_for(&self.config, backend.as_ref(), &self.endpoints);
            let pages = DocsPages::render(&self.config.docs, &self.config.openapi.title, &document)?;
            Some(Arc::new(pages))
        } else {
            None
        };
        check_routes(&self.endpoints, docs.as_deref())?;

        for endpoint in &self.endpoints {
            tracing::info!("Registering {} {}", endpoint.method(), endpoint.path());
        }
        let mut routing: Vec<usize> = (0..self.endpoints.len()).collect();
        routing.sort_by_key(|&index| self.endpoints[index].template().precedence());

        Ok(HyperApp {
            backend,
            endpoints: Arc::new(self.endpoints),
            routing: Arc::new(routing),
            docs,
        })
    }
}

impl<B> Service<Request<B>> for HyperApp
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let app = self.clone();
        Box::pin(async move { Ok(app.handle(request).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::depend::Arguments;
    use crate::core::endpoint::Reply;
    use crate::core::field::{Field, FieldType};
    use http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn config() -> BindConfig {
        BindConfig {
            backend: BackendKind::Hyper,
            ..BindConfig::default_config()
        }
    }

    fn app() -> HyperApp {
        let endpoint = Endpoint::post("/items/{id}")
            .param("id", Field::path().of_type(FieldType::Integer))
            .param("name", Field::body())
            .handler(|args: Arguments| async move {
                let id: i64 = args.get("id")?;
                let name: String = args.get("name")?;
                Ok::<_, BindError>(Reply::json(json!({ "id": id, "name": name })))
            })
            .build()
            .unwrap();
        HyperApp::builder(config()).route(endpoint).build().unwrap()
    }

    fn request(method: &str, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_routes_request() {
        let response = app()
            .oneshot(request("POST", "/items/3", r#"{"name":"lamp"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, json!({ "id": 3, "name": "lamp" }));
    }

    #[tokio::test]
    async fn test_validation_error_is_400_text() {
        let response = app()
            .oneshot(request("POST", "/items/x", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("id"));
    }

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let response = app().oneshot(request("GET", "/nope", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app().oneshot(request("GET", "/items/3", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_serves_docs() {
        let response = app()
            .oneshot(request("GET", "/docs/openapi.json", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(doc["paths"]["/items/{id}"]["post"].is_object());
        assert!(doc["paths"]["/items/{id}"]["post"]["responses"]["400"].is_object());
    }

    fn tagged(path: &str, tag: &'static str) -> Endpoint {
        let mut builder = Endpoint::get(path);
        if path.contains("{name}") {
            builder = builder.param("name", Field::path());
        }
        builder
            .handler(move |args: Arguments| async move {
                let name: Option<String> = args.get("name").ok();
                Ok::<_, BindError>(Reply::json(json!({ "tag": tag, "name": name })))
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_static_route_beats_earlier_capture() {
        let app = HyperApp::builder(config())
            .route(tagged("/items/{name}", "param"))
            .route(tagged("/items/special", "static"))
            .build()
            .unwrap();

        let response = app.clone().oneshot(request("GET", "/items/special", "")).await.unwrap();
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["tag"], "static");

        let response = app.oneshot(request("GET", "/items/other", "")).await.unwrap();
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body, json!({ "tag": "param", "name": "other" }));
    }

    #[tokio::test]
    async fn test_captures_are_decoded() {
        let app = HyperApp::builder(config())
            .route(tagged("/items/{name}", "param"))
            .build()
            .unwrap();
        let response = app
            .clone()
            .oneshot(request("GET", "/items/hello%20world", ""))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["name"], "hello world");

        let response = app.oneshot(request("GET", "/items/%FF", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("UTF-8"));
    }

    #[test]
    fn test_duplicate_route_fails() {
        let result = HyperApp::builder(config())
            .route(tagged("/x", "first"))
            .route(tagged("/x", "second"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_docs_settings_fail() {
        let mut bad_prefix = config();
        bad_prefix.docs.prefix = "docs".to_string();
        assert!(HyperApp::builder(bad_prefix).build().is_err());

        let docs_clash = tagged("/docs/openapi.json", "clash");
        assert!(HyperApp::builder(config()).route(docs_clash).build().is_err());
    }

    #[test]
    fn test_rejects_axum_backend() {
        let result = HyperApp::builder(BindConfig::default_config()).build();
        assert!(result.is_err());
    }
}

//! Documentation routes: `openapi.json`, `openapi.yaml` and the UI pages

use crate::config::DocsConfig;
use crate::core::error::BindResult;
use crate::openapi::{OpenApiDocument, to_json, to_yaml, ui};
use axum::Router;
use axum::routing::get;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, Response, StatusCode};
use http_body_util::Full;
use std::collections::HashSet;

const JSON: &str = "application/json";
const YAML: &str = "application/yaml";
const HTML: &str = "text/html; charset=utf-8";

/// Pre-rendered documentation, served by both the axum and the hyper app
#[derive(Debug, Clone)]
pub struct DocsPages {
    pages: Vec<DocsPage>,
}

#[derive(Debug, Clone)]
struct DocsPage {
    path: String,
    content_type: &'static str,
    body: String,
}

impl DocsPages {
    pub fn render(docs: &DocsConfig, title: &str, document: &OpenApiDocument) -> BindResult<Self> {
        docs.validate()?;
        let json_path = docs.json_path();
        let mut pages = vec![
            DocsPage {
                path: json_path.clone(),
                content_type: JSON,
                body: to_json(document)?,
            },
            DocsPage {
                path: docs.yaml_path(),
                content_type: YAML,
                body: to_yaml(document)?,
            },
        ];
        let mut mounted = HashSet::new();
        for &kind in &docs.ui {
            if !mounted.insert(kind) {
                tracing::warn!("Documentation UI '{}' listed twice, mounted once", kind.slug());
                continue;
            }
            pages.push(DocsPage {
                path: docs.ui_path(kind),
                content_type: HTML,
                body: ui::render(kind, title, &json_path),
            });
        }
        Ok(Self { pages })
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|p| p.path.as_str())
    }

    /// Response for `GET path`, if it is a documentation page
    pub fn respond(&self, method: &Method, path: &str) -> Option<Response<Full<Bytes>>> {
        if method != Method::GET {
            return None;
        }
        let page = self.pages.iter().find(|p| p.path == path)?;
        Some(page.response())
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for page in &self.pages {
            let page = page.clone();
            tracing::info!("Serving docs at {}", page.path);
            router = router.route(
                &page.path.clone(),
                get(move || {
                    let page = page.clone();
                    async move { page.response().map(axum::body::Body::new) }
                }),
            );
        }
        router
    }
}

impl DocsPage {
    fn response(&self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(self.body.clone())));
        *response.status_mut() = StatusCode::OK;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocUi, OpenApiConfig};
    use crate::openapi::OpenApiBuilder;

    fn pages(ui: Vec<DocUi>) -> DocsPages {
        let docs = DocsConfig {
            enabled: true,
            prefix: "/docs/".to_string(),
            ui,
        };
        let document = OpenApiBuilder::new(&OpenApiConfig::default()).build();
        DocsPages::render(&docs, "Test", &document).unwrap()
    }

    #[test]
    fn test_paths() {
        let pages = pages(vec![DocUi::Swagger, DocUi::Elements]);
        assert_eq!(
            pages.paths().collect::<Vec<_>>(),
            vec![
                "/docs/openapi.json",
                "/docs/openapi.yaml",
                "/docs/swagger",
                "/docs/elements"
            ]
        );
    }

    #[test]
    fn test_duplicate_ui_is_mounted_once() {
        let pages = pages(vec![DocUi::Swagger, DocUi::Swagger]);
        assert_eq!(pages.paths().filter(|p| p.ends_with("/swagger")).count(), 1);
        // The axum router must not see the page twice
        let _ = pages.router();
    }

    #[test]
    fn test_rejects_relative_prefix() {
        let docs = DocsConfig {
            enabled: true,
            prefix: "docs".to_string(),
            ui: vec![DocUi::Swagger],
        };
        let document = OpenApiBuilder::new(&OpenApiConfig::default()).build();
        let err = DocsPages::render(&docs, "Test", &document).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_respond() {
        let pages = pages(vec![]);
        let response = pages.respond(&Method::GET, "/docs/openapi.yaml").unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], YAML);
        assert!(pages.respond(&Method::POST, "/docs/openapi.json").is_none());
        assert!(pages.respond(&Method::GET, "/docs/redoc").is_none());
    }
}

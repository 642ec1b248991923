//! axum backend
//!
//! [`AxumRequest`] is an axum extractor: it buffers the body, captures the
//! router's path parameters and exposes the uniform [`RequestAdapter`] view.

use super::{Backend, BackendKind};
use crate::core::error::{BindError, BindResult, RequestError};
use crate::core::request::{Files, MultiParams, Params, RequestAdapter, RequestParts};
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{FromRequest, FromRequestParts, RawPathParams, Request};
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, Method, Uri};
use serde_json::Value;

/// Largest body the extractor buffers
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Backend for axum routers
#[derive(Debug, Clone, Copy, Default)]
pub struct AxumBackend;

impl Backend for AxumBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Axum
    }
}

/// Request adapter over an axum request
#[derive(Debug)]
pub struct AxumRequest {
    parts: RequestParts,
}

impl AxumRequest {
    pub fn parts(&self) -> &RequestParts {
        &self.parts
    }
}

impl<S> FromRequest<S> for AxumRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut head, body) = req.into_parts();

        // Outside a route with captures there are simply no path params
        let path: Params = match RawPathParams::from_request_parts(&mut head, state).await {
            Ok(raw) => raw
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(RawPathParamsRejection::InvalidUtf8InPathParam(e)) => {
                return Err(BindError::from(RequestError::InvalidPath {
                    message: e.body_text(),
                })
                .into_response());
            }
            Err(_) => Params::new(),
        };

        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| {
                BindError::from(RequestError::InvalidBody {
                    message: e.to_string(),
                })
                .into_response()
            })?;

        Ok(Self {
            parts: RequestParts::new(head, bytes, path).await,
        })
    }
}

impl RequestAdapter for AxumRequest {
    fn backend(&self) -> BackendKind {
        BackendKind::Axum
    }

    fn method(&self) -> &Method {
        self.parts.method()
    }

    fn uri(&self) -> &Uri {
        self.parts.uri()
    }

    fn header(&self) -> &HeaderMap {
        self.parts.headers()
    }

    fn cookie(&self) -> &Params {
        self.parts.cookie()
    }

    fn query(&self) -> &Params {
        self.parts.query()
    }

    fn multiquery(&self) -> &MultiParams {
        self.parts.multiquery()
    }

    fn path(&self) -> &Params {
        self.parts.path()
    }

    fn form(&self) -> BindResult<&Params> {
        self.parts.form()
    }

    fn multiform(&self) -> BindResult<&MultiParams> {
        self.parts.multiform()
    }

    fn file(&self) -> BindResult<&Files> {
        self.parts.file()
    }

    fn body(&self) -> BindResult<&Value> {
        self.parts.body()
    }
}

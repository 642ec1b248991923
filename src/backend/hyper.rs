//! hyper / tower backend
//!
//! Works with any `http::Request<B>` whose body implements `http_body::Body`,
//! so it serves plain hyper services and tower stacks alike. Path parameters
//! come from whatever router matched the request.

use super::{Backend, BackendKind, error_response};
use crate::core::error::{BindError, BindResult, RequestError};
use crate::core::request::{Files, MultiParams, Params, RequestAdapter, RequestParts};
use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use serde_json::Value;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Backend for hyper services
///
/// Validation failures map to 400 and errors render as plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperBackend;

impl Backend for HyperBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hyper
    }

    fn validation_status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn render_error(&self, err: &BindError) -> Response<Full<Bytes>> {
        let message = err.to_response().message;
        error_response(
            self.status_for(err),
            err.headers(),
            "text/plain; charset=utf-8",
            Bytes::from(message),
        )
    }
}

/// Request adapter over a buffered `http::Request`
#[derive(Debug)]
pub struct HyperRequest {
    parts: RequestParts,
}

impl HyperRequest {
    /// Buffer the body of `request` and attach router path params
    pub async fn from_request<B>(request: http::Request<B>, path: Params) -> BindResult<Self>
    where
        B: http_body::Body,
        B::Error: Into<BoxError>,
    {
        let (head, body) = request.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| {
                let e: BoxError = e.into();
                BindError::from(RequestError::InvalidBody {
                    message: e.to_string(),
                })
            })?
            .to_bytes();

        Ok(Self {
            parts: RequestParts::new(head, bytes, path).await,
        })
    }

    pub fn parts(&self) -> &RequestParts {
        &self.parts
    }
}

impl RequestAdapter for HyperRequest {
    fn backend(&self) -> BackendKind {
        BackendKind::Hyper
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

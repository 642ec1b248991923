//! Endpoints: a route, its declared params and the handler they feed
//!
//! ```rust,ignore
//! let endpoint = Endpoint::get("/users/{id}")
//!     .summary("Fetch one user")
//!     .param("id", Field::path().of_type(FieldType::Integer))
//!     .param("verbose", Field::query().of_type(FieldType::Boolean).default(json!(false)))
//!     .handler(|args: Arguments| async move {
//!         let id: i64 = args.get("id")?;
//!         Ok(Reply::json(json!({ "id": id })))
//!     })
//!     .build()?;
//! ```

use crate::backend::Backend;
use crate::core::depend::{Arguments, Depends, Param, Resolver, Source};
use crate::core::error::{BindResult, ConfigError};
use crate::core::field::FieldKind;
use crate::core::path::PathTemplate;
use crate::core::request::RequestAdapter;
use async_trait::async_trait;
use axum::response::IntoResponse;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Async handler receiving resolved arguments
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, args: Arguments) -> BindResult<Reply>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = BindResult<Reply>> + Send + 'static,
{
    async fn call(&self, args: Arguments) -> BindResult<Reply> {
        (self)(args).await
    }
}

// =============================================================================
// Reply
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Json(Value),
    Text(String),
    Html(String),
    Empty,
}

/// Backend-neutral handler response
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ReplyBody,
}

impl Reply {
    fn with_body(body: ReplyBody) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn json(value: Value) -> Self {
        Self::with_body(ReplyBody::Json(value))
    }

    /// Serialize `value` as the JSON body
    pub fn serialize<T: Serialize>(value: &T) -> BindResult<Self> {
        Ok(Self::json(serde_json::to_value(value)?))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_body(ReplyBody::Text(text.into()))
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self::with_body(ReplyBody::Html(html.into()))
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::with_body(ReplyBody::Empty)
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn into_http(self) -> Response<Full<Bytes>> {
        let (content_type, bytes) = match self.body {
            ReplyBody::Json(value) => (
                Some("application/json"),
                Bytes::from(serde_json::to_vec(&value).unwrap_or_default()),
            ),
            ReplyBody::Text(text) => (Some("text/plain; charset=utf-8"), Bytes::from(text)),
            ReplyBody::Html(html) => (Some("text/html; charset=utf-8"), Bytes::from(html)),
            ReplyBody::Empty => (None, Bytes::new()),
        };

        let mut response = Response::new(Full::new(bytes));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(content_type) = content_type {
            if !response.headers().contains_key(CONTENT_TYPE) {
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        response
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> axum::response::Response {
        self.into_http().map(axum::body::Body::new)
    }
}

/// A documented response of an endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseModel {
    pub status: u16,
    pub description: String,
    pub media_type: Option<String>,
    pub example: Option<Value>,
}

impl ResponseModel {
    pub fn new(status: u16, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
            media_type: Some("application/json".to_string()),
            example: None,
        }
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Response without a body
    pub fn no_content(mut self) -> Self {
        self.media_type = None;
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }
}

// =============================================================================
// Signature
// =============================================================================

/// One param as every backend sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSignature {
    pub name: String,
    /// Field kind, or `depends`
    pub kind: String,
    /// Request key, empty for dependencies
    pub key: String,
    pub field_type: String,
    pub required: bool,
}

/// Backend-agnostic description of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub method: String,
    pub path: String,
    pub params: Vec<ParamSignature>,
    pub responses: Vec<u16>,
}

// =============================================================================
// Endpoint
// =============================================================================

/// A route bound to a handler
#[derive(Clone)]
pub struct Endpoint {
    method: Method,
    path: PathTemplate,
    operation_id: String,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    deprecated: bool,
    params: Vec<Param>,
    pre_depends: Vec<Depends>,
    responses: Vec<ResponseModel>,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method)
            .field("path", &self.path.as_str())
            .field("operation_id", &self.operation_id)
            .field("params", &self.params.len())
            .finish()
    }
}

impl Endpoint {
    pub fn builder(method: Method, path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(method, path)
    }

    pub fn get(path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(Method::DELETE, path)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    pub fn template(&self) -> &PathTemplate {
        &self.path
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn pre_depends(&self) -> &[Depends] {
        &self.pre_depends
    }

    pub fn responses(&self) -> &[ResponseModel] {
        &self.responses
    }

    pub fn signature(&self) -> Signature {
        let params = self
            .params
            .iter()
            .map(|param| match &param.source {
                Source::Field(field) => ParamSignature {
                    name: param.name.clone(),
                    kind: field.kind().to_string(),
                    key: field.key(&param.name).to_string(),
                    field_type: field.field_type().name(),
                    required: field.is_required(),
                },
                Source::Depends(dep) => ParamSignature {
                    name: param.name.clone(),
                    kind: "depends".to_string(),
                    key: String::new(),
                    field_type: dep.provider().name().to_string(),
                    required: true,
                },
            })
            .collect();

        Signature {
            method: self.method.to_string(),
            path: self.path.as_str().to_string(),
            params,
            responses: self.responses.iter().map(|r| r.status).collect(),
        }
    }

    /// Resolve the params against `request` and run the handler
    pub async fn call(&self, request: &dyn RequestAdapter) -> BindResult<Reply> {
        let resolver = Resolver::new(request);
        resolver.run_pre_depends(&self.pre_depends).await?;
        let args = resolver.resolve(&self.params).await?;
        self.handler.call(args).await
    }

    /// Like [`Endpoint::call`], with errors rendered by `backend`
    pub async fn respond(
        &self,
        request: &dyn RequestAdapter,
        backend: &dyn Backend,
    ) -> Response<Full<Bytes>> {
        match self.call(request).await {
            Ok(reply) => reply.into_http(),
            Err(err) => {
                let status = backend.status_for(&err);
                if status.is_server_error() {
                    tracing::error!("{} {} failed: {}", self.method, self.path.as_str(), err);
                } else {
                    tracing::debug!("{} {} rejected: {}", self.method, self.path.as_str(), err);
                }
                backend.render_error(&err)
            }
        }
    }
}

/// Builder for [`Endpoint`]
pub struct EndpointBuilder {
    method: Method,
    path: String,
    operation_id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    deprecated: bool,
    params: Vec<Param>,
    pre_depends: Vec<Depends>,
    responses: Vec<ResponseModel>,
    handler: Option<Arc<dyn Handler>>,
}

impl EndpointBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            deprecated: false,
            params: Vec::new(),
            pre_depends: Vec::new(),
            responses: Vec::new(),
            handler: None,
        }
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn param(mut self, name: impl Into<String>, field: crate::core::field::Field) -> Self {
        self.params.push(Param::field(name, field));
        self
    }

    pub fn depends(mut self, name: impl Into<String>, depends: Depends) -> Self {
        self.params.push(Param::depends(name, depends));
        self
    }

    /// Dependency run before the handler, its value is discarded
    pub fn pre_depends(mut self, depends: Depends) -> Self {
        self.pre_depends.push(depends);
        self
    }

    pub fn response(mut self, response: ResponseModel) -> Self {
        self.responses.push(response);
        self
    }

    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Endpoint, ConfigError> {
        let label = format!("{} {}", self.method, self.path);
        let handler = self.handler.ok_or_else(|| ConfigError::MissingField {
            field: "handler".to_string(),
            context: label.clone(),
        })?;

        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for param in &self.params {
            if !names.insert(param.name.as_str()) {
                return Err(ConfigError::DuplicateParameter {
                    endpoint: label,
                    name: param.name.clone(),
                });
            }
            if let Some(field) = param.as_field() {
                if !keys.insert((field.kind(), field.key(&param.name))) {
                    return Err(ConfigError::DuplicateParameter {
                        endpoint: label,
                        name: field.key(&param.name).to_string(),
                    });
                }
            }
        }

        let path = PathTemplate::parse(&self.path);
        let mut declared = HashSet::new();
        collect_path_keys(&self.params, &mut declared, 0);
        for dep in &self.pre_depends {
            collect_path_keys(dep.provider().params(), &mut declared, 1);
        }
        let template: HashSet<String> = path.param_names().into_iter().map(String::from).collect();
        if let Some(undeclared) = template.difference(&declared).next() {
            return Err(ConfigError::SignatureMismatch {
                endpoint: label,
                message: format!("path parameter '{}' has no path field", undeclared),
            });
        }
        if let Some(unknown) = declared.difference(&template).next() {
            return Err(ConfigError::SignatureMismatch {
                endpoint: label,
                message: format!("path field '{}' is not part of the route", unknown),
            });
        }

        let operation_id = self
            .operation_id
            .unwrap_or_else(|| default_operation_id(&self.method, &self.path));

        let mut responses = self.responses;
        if responses.is_empty() {
            responses.push(ResponseModel::new(200, "Successful Response"));
        }

        Ok(Endpoint {
            method: self.method,
            path,
            operation_id,
            summary: self.summary,
            description: self.description,
            tags: self.tags,
            deprecated: self.deprecated,
            params: self.params,
            pre_depends: self.pre_depends,
            responses,
            handler,
        })
    }
}

fn collect_path_keys(params: &[Param], out: &mut HashSet<String>, depth: usize) {
    if depth > crate::core::depend::DEFAULT_MAX_DEPTH {
        return;
    }
    for param in params {
        match &param.source {
            Source::Field(field) if field.kind() == FieldKind::Path => {
                out.insert(field.key(&param.name).to_string());
            }
            Source::Field(_) => {}
            Source::Depends(dep) => collect_path_keys(dep.provider().params(), out, depth + 1),
        }
    }
}

/// `GET /users/{id}` becomes `get_users_id`
fn default_operation_id(method: &Method, path: &str) -> String {
    let mut id = method.as_str().to_ascii_lowercase();
    for part in path.split(|c: char| !c.is_ascii_alphanumeric()) {
        if !part.is_empty() {
            id.push('_');
            id.push_str(part);
        }
    }
    id
}

//! In-memory backend
//!
//! `MockRequest` is a fully materialised request built by hand. It lets
//! endpoints and dependencies be exercised without any HTTP server, which is
//! what most unit tests in this crate do.

use super::{Backend, BackendKind};
use crate::core::error::{BindResult, RequestError};
use crate::core::request::{Files, MultiParams, Params, RequestAdapter, UploadFile, first_values};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde_json::Value;

/// Backend for in-memory requests
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBackend;

impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }
}

/// Hand-built request
#[derive(Debug, Clone)]
pub struct MockRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    cookies: Params,
    query: Params,
    multiquery: MultiParams,
    path: Params,
    form: Option<(Params, MultiParams)>,
    files: Option<Files>,
    body: Option<Value>,
}

impl MockRequest {
    pub fn builder() -> MockRequestBuilder {
        MockRequestBuilder::default()
    }
}

impl RequestAdapter for MockRequest {
    fn backend(&self) -> BackendKind {
        BackendKind::Mock
    }

    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn header(&self) -> &HeaderMap {
        &self.headers
    }

    fn cookie(&self) -> &Params {
        &self.cookies
    }

    fn query(&self) -> &Params {
        &self.query
    }

    fn multiquery(&self) -> &MultiParams {
        &self.multiquery
    }

    fn path(&self) -> &Params {
        &self.path
    }

    fn form(&self) -> BindResult<&Params> {
        self.form
            .as_ref()
            .map(|(form, _)| form)
            .ok_or_else(|| no_form().into())
    }

    fn multiform(&self) -> BindResult<&MultiParams> {
        self.form
            .as_ref()
            .map(|(_, multi)| multi)
            .ok_or_else(|| no_form().into())
    }

    fn file(&self) -> BindResult<&Files> {
        self.files.as_ref().ok_or_else(|| {
            RequestError::UnsupportedMediaType {
                expected: "multipart/form-data".to_string(),
                actual: None,
            }
            .into()
        })
    }

    fn body(&self) -> BindResult<&Value> {
        self.body
            .as_ref()
            .ok_or_else(|| RequestError::MissingBody.into())
    }
}

fn no_form() -> RequestError {
    RequestError::UnsupportedMediaType {
        expected: "application/x-www-form-urlencoded or multipart/form-data".to_string(),
        actual: None,
    }
}

/// Builder for [`MockRequest`]
#[derive(Debug, Default)]
pub struct MockRequestBuilder {
    method: Option<Method>,
    uri: Option<Uri>,
    headers: HeaderMap,
    cookies: Params,
    multiquery: MultiParams,
    path: Params,
    multiform: Option<MultiParams>,
    files: Option<Files>,
    body: Option<Value>,
}

impl MockRequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the URI; its query string is merged into the query parameters
    pub fn uri(mut self, uri: &str) -> Self {
        if let Ok(uri) = uri.parse::<Uri>() {
            if let Some(query) = uri.query() {
                for (key, value) in form_urlencoded::parse(query.as_bytes()) {
                    self.multiquery
                        .entry(key.into_owned())
                        .or_default()
                        .push(value.into_owned());
                }
            }
            self.uri = Some(uri);
        }
        self
    }

    /// Add a header; invalid names or values are ignored
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.multiquery
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn path_param(mut self, name: &str, value: &str) -> Self {
        self.path.insert(name.to_string(), value.to_string());
        self
    }

    pub fn form(mut self, name: &str, value: &str) -> Self {
        self.multiform
            .get_or_insert_with(MultiParams::new)
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn file(mut self, name: &str, file: UploadFile) -> Self {
        self.files
            .get_or_insert_with(Files::new)
            .entry(name.to_string())
            .or_default()
            .push(file);
        // A multipart body carries a (possibly empty) form as well
        self.multiform.get_or_insert_with(MultiParams::new);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> MockRequest {
        MockRequest {
            method: self.method.unwrap_or(Method::GET),
            uri: self.uri.unwrap_or_else(|| Uri::from_static("/")),
            headers: self.headers,
            cookies: self.cookies,
            query: first_values(&self.multiquery),
            multiquery: self.multiquery,
            path: self.path,
            form: self
                .multiform
                .map(|multi| (first_values(&multi), multi)),
            files: self.files,
            body: self.body,
        }
    }
}

//! Uniform request view over backend-specific requests
//!
//! Every backend wraps its native request in a type implementing
//! [`RequestAdapter`]. Field extraction only ever talks to this trait.
//!
//! Accessors hand out the native container when one exists (`HeaderMap`) and
//! locally materialised maps otherwise. Failures (wrong content type, missing
//! or malformed body) surface as [`RequestError`]s, unnormalised.

use crate::backend::BackendKind;
use crate::core::error::{BindResult, RequestError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Single-valued key/value pairs (first value wins)
pub type Params = HashMap<String, String>;

/// Multi-valued key/value pairs, in request order
pub type MultiParams = HashMap<String, Vec<String>>;

/// Uploaded files by form field name
pub type Files = HashMap<String, Vec<UploadFile>>;

/// A file received in a `multipart/form-data` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

mod base64_bytes {
    use super::{Engine, STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Read-only view over a request, implemented once per backend
pub trait RequestAdapter: Send + Sync {
    /// Backend that produced this request
    fn backend(&self) -> BackendKind;

    fn method(&self) -> &Method;

    fn uri(&self) -> &Uri;

    /// Request headers (native container)
    fn header(&self) -> &HeaderMap;

    /// Cookies parsed from every `Cookie` header
    fn cookie(&self) -> &Params;

    /// Query string, first value per key
    fn query(&self) -> &Params;

    /// Query string, all values per key
    fn multiquery(&self) -> &MultiParams;

    /// Path parameters captured by the router
    fn path(&self) -> &Params;

    /// Form fields, first value per key
    fn form(&self) -> BindResult<&Params>;

    /// Form fields, all values per key
    fn multiform(&self) -> BindResult<&MultiParams>;

    /// Files from a multipart body
    fn file(&self) -> BindResult<&Files>;

    /// JSON body
    fn body(&self) -> BindResult<&Value>;
}

const FORM_MEDIA_TYPES: &str = "application/x-www-form-urlencoded or multipart/form-data";

#[derive(Debug, Default)]
struct MultipartData {
    fields: MultiParams,
    files: Files,
}

/// Buffered request shared by the HTTP-based adapters
///
/// Expensive parses are memoised per request. Multipart bodies need an async
/// reader and are therefore parsed once, when the parts are built; a parse
/// failure is kept and reported by the form/file accessors.
#[derive(Debug)]
pub struct RequestParts {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: Params,
    body: Bytes,
    multipart: Option<Result<MultipartData, String>>,
    query: OnceLock<Params>,
    multiquery: OnceLock<MultiParams>,
    cookie: OnceLock<Params>,
    form: OnceLock<Params>,
    multiform: OnceLock<MultiParams>,
    json: OnceLock<Result<Value, String>>,
}

impl RequestParts {
    /// Build from request head, fully buffered body and router path params
    pub async fn new(parts: http::request::Parts, body: Bytes, path: Params) -> Self {
        Self::from_components(parts.method, parts.uri, parts.headers, body, path).await
    }

    pub async fn from_components(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        path: Params,
    ) -> Self {
        // Boundaries are case-sensitive, so parse from the raw header value
        let raw_content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let multipart = match raw_content_type {
            Some(ct) if ct.to_ascii_lowercase().starts_with("multipart/form-data") => {
                Some(parse_multipart(&ct, body.clone()).await)
            }
            _ => None,
        };

        Self {
            method,
            uri,
            headers,
            path,
            body,
            multipart,
            query: OnceLock::new(),
            multiquery: OnceLock::new(),
            cookie: OnceLock::new(),
            form: OnceLock::new(),
            multiform: OnceLock::new(),
            json: OnceLock::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn path(&self) -> &Params {
        &self.path
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<String> {
        content_type(&self.headers)
    }

    pub fn multiquery(&self) -> &MultiParams {
        self.multiquery
            .get_or_init(|| parse_urlencoded(self.uri.query().unwrap_or("").as_bytes()))
    }

    pub fn query(&self) -> &Params {
        self.query.get_or_init(|| first_values(self.multiquery()))
    }

    pub fn cookie(&self) -> &Params {
        self.cookie.get_or_init(|| parse_cookies(&self.headers))
    }

    pub fn multiform(&self) -> BindResult<&MultiParams> {
        if let Some(multipart) = &self.multipart {
            return multipart
                .as_ref()
                .map(|data| &data.fields)
                .map_err(|message| RequestError::InvalidBody {
                    message: message.clone(),
                }
                .into());
        }
        match self.content_type() {
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                Ok(self.multiform.get_or_init(|| parse_urlencoded(&self.body)))
            }
            actual => Err(RequestError::UnsupportedMediaType {
                expected: FORM_MEDIA_TYPES.to_string(),
                actual,
            }
            .into()),
        }
    }

    pub fn form(&self) -> BindResult<&Params> {
        let multiform = self.multiform()?;
        Ok(self.form.get_or_init(|| first_values(multiform)))
    }

    pub fn file(&self) -> BindResult<&Files> {
        match &self.multipart {
            Some(Ok(data)) => Ok(&data.files),
            Some(Err(message)) => Err(RequestError::InvalidBody {
                message: message.clone(),
            }
            .into()),
            None => Err(RequestError::UnsupportedMediaType {
                expected: "multipart/form-data".to_string(),
                actual: self.content_type(),
            }
            .into()),
        }
    }

    pub fn body(&self) -> BindResult<&Value> {
        if let Some(ct) = self.content_type() {
            if !is_json(&ct) {
                return Err(RequestError::UnsupportedMediaType {
                    expected: "application/json".to_string(),
                    actual: Some(ct),
                }
                .into());
            }
        }
        if self.body.is_empty() {
            return Err(RequestError::MissingBody.into());
        }
        self.json
            .get_or_init(|| serde_json::from_slice(&self.body).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|message| {
                RequestError::InvalidBody {
                    message: message.clone(),
                }
                .into()
            })
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    essence == "application/json" || essence.ends_with("+json")
}

pub(crate) fn parse_urlencoded(input: &[u8]) -> MultiParams {
    let mut params = MultiParams::new();
    for (key, value) in form_urlencoded::parse(input) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

pub(crate) fn first_values(multi: &MultiParams) -> Params {
    multi
        .iter()
        .filter_map(|(k, v)| v.first().map(|first| (k.clone(), first.clone())))
        .collect()
}

pub(crate) fn parse_cookies(headers: &HeaderMap) -> Params {
    let mut cookies = Params::new();
    for header in headers.get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for pair in header.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    cookies
                        .entry(name.to_string())
                        .or_insert_with(|| value.trim().trim_matches('"').to_string());
                }
            }
        }
    }
    cookies
}

async fn parse_multipart(content_type: &str, body: Bytes) -> Result<MultipartData, String> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| e.to_string())?;
    let stream = futures::stream::once(async move { Ok::<Bytes, std::convert::Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut data = MultipartData::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        match filename {
            Some(filename) => {
                let content_type = field.content_type().map(|m| m.to_string());
                let bytes = field.bytes().await.map_err(|e| e.to_string())?;
                data.files.entry(name).or_default().push(UploadFile {
                    filename,
                    content_type,
                    data: bytes.to_vec(),
                });
            }
            None => {
                let text = field.text().await.map_err(|e| e.to_string())?;
                data.fields.entry(name).or_default().push(text);
            }
        }
    }

    tracing::debug!(
        fields = data.fields.len(),
        files = data.files.len(),
        "parsed multipart body"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    async fn parts(
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: &'static str,
    ) -> RequestParts {
        let mut builder = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        RequestParts::new(parts, Bytes::from_static(body.as_bytes()), Params::new()).await
    }

    #[tokio::test]
    async fn test_query_first_and_multi_values() {
        let req = parts("GET", "/items?tag=a&tag=b&page=2", &[], "").await;
        assert_eq!(req.query()["tag"], "a");
        assert_eq!(req.query()["page"], "2");
        assert_eq!(req.multiquery()["tag"], vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_query_is_memoised() {
        let req = parts("GET", "/items?tag=a", &[], "").await;
        let first = req.multiquery() as *const MultiParams;
        let second = req.multiquery() as *const MultiParams;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cookies() {
        let req = parts(
            "GET",
            "/",
            &[("cookie", "session=abc; theme=\"dark\""), ("cookie", "lang=fr")],
            "",
        )
        .await;
        assert_eq!(req.cookie()["session"], "abc");
        assert_eq!(req.cookie()["theme"], "dark");
        assert_eq!(req.cookie()["lang"], "fr");
    }

    #[tokio::test]
    async fn test_urlencoded_form() {
        let req = parts(
            "POST",
            "/login",
            &[("content-type", "application/x-www-form-urlencoded")],
            "username=bob&password=b%20b&scope=a+b",
        )
        .await;
        let form = req.form().expect("form");
        assert_eq!(form["username"], "bob");
        assert_eq!(form["password"], "b b");
        assert_eq!(form["scope"], "a b");
    }

    #[tokio::test]
    async fn test_form_rejects_json_content_type() {
        let req = parts(
            "POST",
            "/login",
            &[("content-type", "application/json")],
            "{}",
        )
        .await;
        let err = req.form().unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_MEDIA_TYPE");
        assert!(req.file().is_err());
    }

    #[tokio::test]
    async fn test_json_body() {
        let req = parts(
            "POST",
            "/users",
            &[("content-type", "application/json; charset=utf-8")],
            r#"{"name":"bob"}"#,
        )
        .await;
        assert_eq!(req.body().unwrap()["name"], "bob");
    }

    #[tokio::test]
    async fn test_json_body_errors() {
        let empty = parts("POST", "/users", &[("content-type", "application/json")], "").await;
        assert_eq!(empty.body().unwrap_err().error_code(), "MISSING_BODY");

        let broken = parts("POST", "/users", &[("content-type", "application/json")], "{").await;
        assert_eq!(broken.body().unwrap_err().error_code(), "INVALID_BODY");

        let text = parts("POST", "/users", &[("content-type", "text/plain")], "hi").await;
        assert_eq!(text.body().unwrap_err().error_code(), "UNSUPPORTED_MEDIA_TYPE");
    }

    #[tokio::test]
    async fn test_multipart_fields_and_files() {
        let body = "--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
report\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
hello\r\n\
--XyZ--\r\n";
        let req = parts(
            "POST",
            "/upload",
            &[("content-type", "multipart/form-data; boundary=XyZ")],
            body,
        )
        .await;

        assert_eq!(req.form().unwrap()["title"], "report");
        let files = req.file().unwrap();
        let upload = &files["upload"][0];
        assert_eq!(upload.filename, "a.txt");
        assert_eq!(upload.content_type.as_deref(), Some("text/plain"));
        assert_eq!(upload.data, b"hello");
    }

    #[test]
    fn test_upload_file_serializes_as_base64() {
        let file = UploadFile {
            filename: "a.bin".to_string(),
            content_type: None,
            data: vec![0, 1, 2],
        };
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["data"], "AAEC");
        let back: UploadFile = serde_json::from_value(value).unwrap();
        assert_eq!(back, file);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use http::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use url::Url;

use crate::error::{Error, Result};
use crate::file::{FileSource, KeyedFile, KeyedFileGroup};
use crate::mimetype::MimeDetector;
use crate::multipart::MultipartBody;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=UTF-8";

/// Ordered string parameters whose values may be absent
///
/// Used for form bodies, query strings, multipart text fields and caller
/// headers. Entries with a `None` value are dropped before encoding; the
/// remaining entries keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Option<String>)>,
}

impl Params {
    /// Create an empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((name.into(), Some(value.into())));
        self
    }

    /// Append a parameter that may be absent
    pub fn with_opt(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.entries.push((name.into(), value.map(Into::into)));
        self
    }

    /// Append a parameter in place
    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.entries.push((name.into(), value));
    }

    /// Iterate over present entries in order
    pub fn present(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Check if a present entry has this name (ASCII case-insensitive)
    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.present().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Number of entries, including absent ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no present entries
    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }
}

impl From<Vec<(String, Option<String>)>> for Params {
    fn from(entries: Vec<(String, Option<String>)>) -> Self {
        Self { entries }
    }
}

impl From<HashMap<String, String>> for Params {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Multipart body specification
///
/// Emitted as: every group's files (field name = group key, group and
/// in-group order kept), then single files (field name = their own key),
/// then text fields.
#[derive(Debug, Default)]
pub struct Multipart {
    pub groups: Vec<KeyedFileGroup>,
    pub files: Vec<KeyedFile>,
    pub fields: Params,
}

impl Multipart {
    /// Create an empty multipart specification
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group of files sharing one field name
    pub fn group(mut self, group: KeyedFileGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Add a single file under its own field name
    pub fn file(mut self, key: impl Into<String>, file: FileSource) -> Self {
        self.files.push(KeyedFile::new(key, file));
        self
    }

    /// Add a text field
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields = self.fields.with(name, value);
        self
    }

    /// Replace the text fields
    pub fn fields(mut self, fields: Params) -> Self {
        self.fields = fields;
        self
    }
}

/// Request body kinds
#[derive(Debug, Default)]
pub enum Body {
    /// No body
    #[default]
    None,
    /// URL-encoded form
    Form(Params),
    /// JSON text, sent verbatim
    Json(String),
    /// XML text, sent verbatim
    Xml(String),
    /// Text with a caller-chosen content type
    Raw { content: String, content_type: String },
    /// Multipart form data
    Multipart(Multipart),
}

/// Everything needed to build one request
///
/// Owned by the caller; the builder only borrows it.
#[derive(Debug)]
pub struct RequestSpec {
    pub method: Method,
    pub uri: String,
    pub query: Params,
    pub headers: Params,
    pub body: Body,
}

impl RequestSpec {
    /// Create a bodiless request specification
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            query: Params::new(),
            headers: Params::new(),
            body: Body::None,
        }
    }

    /// Create a GET specification
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Create a POST specification
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Set the query parameters
    pub fn query(mut self, query: Params) -> Self {
        self.query = query;
        self
    }

    /// Set the caller headers
    pub fn headers(mut self, headers: Params) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}

/// Encoded request payload
enum Payload {
    Bytes(Bytes),
    Multipart(MultipartBody),
}

/// A fully built, transport-ready request
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    payload: Payload,
}

impl Request {
    /// Create a new request
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            url,
            headers,
            payload: Payload::Bytes(body),
        }
    }

    /// Get the HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the encoded body; `None` for multipart, which is streamed on send
    pub fn body(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Bytes(body) => Some(body),
            Payload::Multipart(_) => None,
        }
    }

    /// Check if the body is multipart form data
    pub fn is_multipart(&self) -> bool {
        matches!(self.payload, Payload::Multipart(_))
    }

    /// Get the effective content type, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Convert to reqwest request
    ///
    /// Multipart bodies are streamed through `client`; the headers built
    /// here replace whatever reqwest would add, except `Content-Length`.
    pub fn into_reqwest_request(self, client: &reqwest::Client) -> Result<reqwest::Request> {
        match self.payload {
            Payload::Bytes(body) => {
                let mut request = reqwest::Request::new(self.method, self.url);
                *request.headers_mut() = self.headers;
                if !body.is_empty() {
                    *request.body_mut() = Some(body.into());
                }
                Ok(request)
            }
            Payload::Multipart(body) => {
                let mut request = client
                    .request(self.method, self.url)
                    .multipart(body.into_form())
                    .build()
                    .map_err(|e| Error::invalid_request(format!("multipart request: {}", e)))?;
                let mut headers = self.headers;
                if let Some(length) = request.headers_mut().remove(CONTENT_LENGTH) {
                    headers.insert(CONTENT_LENGTH, length);
                }
                *request.headers_mut() = headers;
                Ok(request)
            }
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Request");
        debug
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers);
        match &self.payload {
            Payload::Bytes(body) => debug.field("body", &format_args!("{} bytes", body.len())),
            Payload::Multipart(body) => debug.field("body", body),
        };
        debug.finish()
    }
}

/// Turns a [`RequestSpec`] into a [`Request`]
///
/// Header precedence, lowest first: the builder's default headers, the
/// content type implied by the body kind, the caller's headers. Caller data
/// is never mutated. Every failure here happens before the network is
/// touched.
#[derive(Clone)]
pub struct RequestBuilder {
    detector: Arc<dyn MimeDetector>,
    default_headers: HeaderMap,
}

impl RequestBuilder {
    /// Create a new request builder
    pub fn new(detector: Arc<dyn MimeDetector>, default_headers: HeaderMap) -> Self {
        Self {
            detector,
            default_headers,
        }
    }

    /// Get the default headers
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Build a bodiless GET request
    pub async fn build_get(
        &self,
        uri: &str,
        query: Option<&Params>,
        headers: Option<&Params>,
    ) -> Result<Request> {
        let spec = RequestSpec::get(uri)
            .query(query.cloned().unwrap_or_default())
            .headers(headers.cloned().unwrap_or_default());
        self.build(&spec).await
    }

    /// Build a URL-encoded form POST
    pub async fn build_form(
        &self,
        uri: &str,
        params: &Params,
        headers: Option<&Params>,
    ) -> Result<Request> {
        let spec = RequestSpec::post(uri)
            .headers(headers.cloned().unwrap_or_default())
            .body(Body::Form(params.clone()));
        self.build(&spec).await
    }

    /// Build a JSON POST
    pub async fn build_json(
        &self,
        uri: &str,
        json: &str,
        headers: Option<&Params>,
    ) -> Result<Request> {
        let spec = RequestSpec::post(uri)
            .headers(headers.cloned().unwrap_or_default())
            .body(Body::Json(json.to_string()));
        self.build(&spec).await
    }

    /// Build an XML POST
    pub async fn build_xml(
        &self,
        uri: &str,
        xml: &str,
        headers: Option<&Params>,
    ) -> Result<Request> {
        let spec = RequestSpec::post(uri)
            .headers(headers.cloned().unwrap_or_default())
            .body(Body::Xml(xml.to_string()));
        self.build(&spec).await
    }

    /// Build a POST whose content type is fully caller-controlled
    pub async fn build_raw(
        &self,
        uri: &str,
        content: &str,
        content_type: &str,
        headers: Option<&Params>,
    ) -> Result<Request> {
        let spec = RequestSpec::post(uri)
            .headers(headers.cloned().unwrap_or_default())
            .body(Body::Raw {
                content: content.to_string(),
                content_type: content_type.to_string(),
            });
        self.build(&spec).await
    }

    /// Build a multipart POST
    ///
    /// Takes the multipart specification by value because file sources
    /// are not cloneable; use [`build`](Self::build) to keep ownership.
    pub async fn build_multipart(
        &self,
        uri: &str,
        multipart: Multipart,
        query: Option<&Params>,
        headers: Option<&Params>,
    ) -> Result<Request> {
        let spec = RequestSpec::post(uri)
            .query(query.cloned().unwrap_or_default())
            .headers(headers.cloned().unwrap_or_default())
            .body(Body::Multipart(multipart));
        self.build(&spec).await
    }

    /// Build any request specification
    pub async fn build(&self, spec: &RequestSpec) -> Result<Request> {
        let url = build_url(&spec.uri, &spec.query)?;

        let (payload, content_type, authoritative) = match &spec.body {
            Body::None => (Payload::Bytes(Bytes::new()), None, false),
            Body::Form(params) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.present())
                    .finish();
                (
                    Payload::Bytes(Bytes::from(encoded)),
                    Some(FORM_CONTENT_TYPE.to_string()),
                    false,
                )
            }
            Body::Json(json) => (
                Payload::Bytes(Bytes::from(json.clone())),
                Some(JSON_CONTENT_TYPE.to_string()),
                false,
            ),
            Body::Xml(xml) => (
                Payload::Bytes(Bytes::from(xml.clone())),
                Some(XML_CONTENT_TYPE.to_string()),
                false,
            ),
            Body::Raw {
                content,
                content_type,
            } => (
                Payload::Bytes(encode_with_charset(content, content_type)),
                Some(content_type.clone()),
                true,
            ),
            Body::Multipart(multipart) => {
                let body = self.encode_multipart(multipart).await?;
                let content_type = body.content_type();
                (Payload::Multipart(body), Some(content_type), false)
            }
        };

        let mut headers = self.default_headers.clone();
        if let Some(content_type) = &content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        }
        for (name, value) in spec.headers.present() {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            if authoritative && name == CONTENT_TYPE {
                continue;
            }
            if name == CONTENT_TYPE && matches!(spec.body, Body::Multipart(_)) {
                tracing::warn!(
                    content_type = value,
                    "caller Content-Type replaces the multipart boundary header"
                );
            }
            headers.insert(name, HeaderValue::from_str(value)?);
        }

        Ok(Request {
            method: spec.method.clone(),
            url,
            headers,
            payload,
        })
    }

    async fn encode_multipart(&self, multipart: &Multipart) -> Result<MultipartBody> {
        let mut body = MultipartBody::new();
        for group in &multipart.groups {
            for file in &group.files {
                body = self.add_file(body, &group.key, file).await?;
            }
        }
        for keyed in &multipart.files {
            body = self.add_file(body, &keyed.key, &keyed.file).await?;
        }
        for (name, value) in multipart.fields.present() {
            body = body.text(name, value);
        }
        Ok(body)
    }

    async fn add_file(
        &self,
        body: MultipartBody,
        key: &str,
        file: &FileSource,
    ) -> Result<MultipartBody> {
        let mime = file.resolve_mime(self.detector.as_ref()).await?;
        let content = file.bytes().await?.clone();
        body.file(key, file.file_name(), mime, content)
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

/// Parse the target and append present query parameters as UTF-8
fn build_url(uri: &str, query: &Params) -> Result<Url> {
    let mut url = Url::parse(uri)?;
    if url.cannot_be_a_base() {
        return Err(Error::uri(format!("{} is not a hierarchical URI", uri)));
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.present());
    }
    Ok(url)
}

/// Encode text with the charset named by a content type, UTF-8 by default
fn encode_with_charset(content: &str, content_type: &str) -> Bytes {
    let encoding = content_type
        .parse::<mime::Mime>()
        .ok()
        .and_then(|m| m.get_param(mime::CHARSET).map(|c| c.as_str().to_string()))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (encoded, _, _) = encoding.encode(content);
    Bytes::from(encoded.into_owned())
}

//! `multipart/form-data` bodies.
//!
//! Parts are encoded by `reqwest::multipart::Form` in browser-compatible
//! form: field names are written verbatim, file names as backslash-escaped
//! quoted strings, and only file parts carry a `Content-Type`.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use crate::error::{Error, Result};

/// An ordered multipart body under a fixed boundary
pub struct MultipartBody {
    form: Form,
    fields: Vec<String>,
}

impl MultipartBody {
    /// Create an empty body with a fresh random boundary
    pub fn new() -> Self {
        Self {
            form: Form::new().percent_encode_noop(),
            fields: Vec::new(),
        }
    }

    /// Append a text field; parts are emitted in insertion order
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.fields.push(name.to_string());
        self.form = self.form.text(name.to_string(), value.to_string());
        self
    }

    /// Append a file part
    pub fn file(
        mut self,
        name: &str,
        file_name: &str,
        content_type: &str,
        content: Bytes,
    ) -> Result<Self> {
        let part = Part::stream(reqwest::Body::from(content))
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|e| {
                Error::invalid_request(format!(
                    "Invalid MIME type {:?} for {}: {}",
                    content_type, file_name, e
                ))
            })?;
        self.fields.push(name.to_string());
        self.form = self.form.part(name.to_string(), part);
        Ok(self)
    }

    /// Get the boundary
    pub fn boundary(&self) -> &str {
        self.form.boundary()
    }

    /// Field names of the parts, in order
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    /// The `Content-Type` header value announcing this body
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary())
    }

    /// Hand the parts over for streaming
    pub fn into_form(self) -> Form {
        self.form
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartBody")
            .field("boundary", &self.boundary())
            .field("fields", &self.fields)
            .finish()
    }
}

//! MIME detection and default charsets.
//!
//! Detection is an injected capability: the request builder asks a
//! [`MimeDetector`] only when a [`FileSource`](crate::file::FileSource) has no
//! declared type. [`SniffingDetector`] is the stock implementation.

use std::collections::HashMap;

use encoding_rs::{Encoding, UTF_8};

use crate::error::DetectionError;

/// Fallback type when nothing more specific is known
pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME type detection capability
///
/// Detecting a stream means materializing it first and calling
/// [`detect_bytes`](MimeDetector::detect_bytes) on the result.
pub trait MimeDetector: Send + Sync {
    /// Detect a MIME type from content
    fn detect_bytes(&self, bytes: &[u8]) -> Result<String, DetectionError>;

    /// Detect a MIME type from a file name
    fn detect_name(&self, name: &str) -> Result<String, DetectionError>;
}

/// Detector using file extensions and leading magic numbers
///
/// Unknown input maps to `application/octet-stream`; it never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SniffingDetector;

impl SniffingDetector {
    /// Create a new sniffing detector
    pub fn new() -> Self {
        Self
    }

    fn by_extension(ext: &str) -> Option<&'static str> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "gif" => Some("image/gif"),
            "bmp" => Some("image/bmp"),
            "webp" => Some("image/webp"),
            "svg" => Some("image/svg+xml"),
            "pdf" => Some("application/pdf"),
            "txt" => Some("text/plain"),
            "csv" => Some("text/csv"),
            "html" | "htm" => Some("text/html"),
            "css" => Some("text/css"),
            "js" => Some("application/javascript"),
            "json" => Some("application/json"),
            "xml" => Some("application/xml"),
            "zip" => Some("application/zip"),
            "tar" => Some("application/x-tar"),
            "gz" => Some("application/gzip"),
            "mp4" => Some("video/mp4"),
            "mp3" => Some("audio/mpeg"),
            _ => None,
        }
    }

    fn by_magic(bytes: &[u8]) -> Option<&'static str> {
        const SIGNATURES: &[(&[u8], &str)] = &[
            (b"\x89PNG\r\n\x1a\n", "image/png"),
            (b"\xff\xd8\xff", "image/jpeg"),
            (b"GIF87a", "image/gif"),
            (b"GIF89a", "image/gif"),
            (b"BM", "image/bmp"),
            (b"%PDF-", "application/pdf"),
            (b"PK\x03\x04", "application/zip"),
            (b"\x1f\x8b", "application/gzip"),
            (b"<?xml", "application/xml"),
        ];
        SIGNATURES
            .iter()
            .find(|(magic, _)| bytes.starts_with(magic))
            .map(|(_, mime)| *mime)
    }
}

impl MimeDetector for SniffingDetector {
    fn detect_bytes(&self, bytes: &[u8]) -> Result<String, DetectionError> {
        if let Some(mime) = Self::by_magic(bytes) {
            return Ok(mime.to_string());
        }
        // Text without a signature: anything that decodes cleanly as UTF-8
        // and has no control bytes besides whitespace.
        let looks_textual = !bytes.is_empty()
            && std::str::from_utf8(bytes).is_ok()
            && bytes
                .iter()
                .all(|b| !b.is_ascii_control() || matches!(b, b'\n' | b'\r' | b'\t'));
        Ok(if looks_textual { "text/plain" } else { OCTET_STREAM }.to_string())
    }

    fn detect_name(&self, name: &str) -> Result<String, DetectionError> {
        let mime = name
            .rsplit_once('.')
            .and_then(|(_, ext)| Self::by_extension(ext))
            .unwrap_or(OCTET_STREAM);
        Ok(mime.to_string())
    }
}

/// Default charsets for MIME types that declare none
///
/// Consulted after an explicit `charset` parameter and before the UTF-8
/// fallback. Keys are MIME essences (`type/subtype`), compared
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CharsetTable {
    defaults: HashMap<String, &'static Encoding>,
}

impl CharsetTable {
    /// Create an empty table
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a table with the registered defaults of common formats
    pub fn standard() -> Self {
        Self::empty()
            .register("application/json", UTF_8)
            .register("application/problem+json", UTF_8)
            .register("application/ld+json", UTF_8)
            .register("application/javascript", UTF_8)
            .register("text/javascript", UTF_8)
            .register("text/event-stream", UTF_8)
            .register("application/x-www-form-urlencoded", UTF_8)
    }

    /// Register the default charset of a MIME type
    pub fn register(mut self, mime_type: &str, encoding: &'static Encoding) -> Self {
        self.defaults.insert(mime_type.to_ascii_lowercase(), encoding);
        self
    }

    /// Look up the default charset of a MIME type
    pub fn lookup(&self, mime_type: &str) -> Option<&'static Encoding> {
        self.defaults.get(&mime_type.to_ascii_lowercase()).copied()
    }

    /// Number of registered MIME types
    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    /// Check if no MIME type is registered
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }
}

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use http::StatusCode;
use mime::Mime;
use serde::de::DeserializeOwned;

use crate::codec::{JsonCodec, XmlCodec};
use crate::error::Result;
use crate::mimetype::CharsetTable;

/// HTTP response representation
///
/// Holds the status, the headers (duplicates kept), and the fully drained
/// body. The charset and the decoded string body are derived
/// lazily and cached, so concurrent readers always see the same value.
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
    content_type: Option<Mime>,
    wire_names: bool,
    charsets: Arc<CharsetTable>,
    charset: OnceLock<&'static Encoding>,
    text: OnceLock<String>,
}

impl Response {
    /// Create a response using the standard charset table
    pub fn new(status: StatusCode, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self::from_parts(status, headers, body, Arc::new(CharsetTable::standard()))
    }

    /// Create a response resolving default charsets from `charsets`
    pub fn from_parts(
        status: StatusCode,
        headers: Vec<(String, String)>,
        body: Bytes,
        charsets: Arc<CharsetTable>,
    ) -> Self {
        let content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .and_then(|(_, value)| value.parse::<Mime>().ok());
        Self {
            status,
            headers,
            body,
            content_type,
            wire_names: false,
            charsets,
            charset: OnceLock::new(),
            text: OnceLock::new(),
        }
    }

    /// Create a response from headers as received on the wire
    ///
    /// Header names arrive lowercased, so [`headers_named`](Self::headers_named)
    /// matches them ignoring ASCII case.
    pub fn from_wire(
        status: StatusCode,
        headers: Vec<(String, String)>,
        body: Bytes,
        charsets: Arc<CharsetTable>,
    ) -> Self {
        Self {
            wire_names: true,
            ..Self::from_parts(status, headers, body, charsets)
        }
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response is successful (2xx status code)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get all headers
    ///
    /// For responses read off the wire, names are lowercase and repeated
    /// names are grouped together at the position of their first
    /// occurrence; values of one name keep their received order, but the
    /// interleaving with other names is lost.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Get the values of every header named `name`, in order
    ///
    /// Names compare exactly on responses built with
    /// [`from_parts`](Self::from_parts) and ignoring ASCII case on
    /// responses received over the network.
    pub fn headers_named(&self, name: &str) -> Vec<&str> {
        if self.wire_names {
            return self.headers_named_ignore_case(name);
        }
        self.headers
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Like [`headers_named`](Self::headers_named), ignoring ASCII case
    pub fn headers_named_ignore_case(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Get the raw body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the parsed `Content-Type`, if present and well formed
    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    /// Get the MIME essence (`type/subtype`), or `""` when unknown
    pub fn mime_type(&self) -> &str {
        self.content_type
            .as_ref()
            .map(|m| m.essence_str())
            .unwrap_or("")
    }

    /// Get the charset used to decode the body
    ///
    /// An explicit `charset` parameter wins, then the table default for the
    /// MIME type, then UTF-8. Unknown labels count as absent.
    ///
    /// Labels resolve per the WHATWG Encoding Standard, as browsers do:
    /// `ISO-8859-1`, `latin1` and `US-ASCII` all name windows-1252, so bytes
    /// 0x80..=0x9F decode to its printable characters (0x80 is `€`) rather
    /// than to C1 controls.
    pub fn charset(&self) -> &'static Encoding {
        *self.charset.get_or_init(|| {
            let mime = match &self.content_type {
                Some(mime) => mime,
                None => return UTF_8,
            };
            mime.get_param(mime::CHARSET)
                .and_then(|label| Encoding::for_label(label.as_str().as_bytes()))
                .or_else(|| self.charsets.lookup(mime.essence_str()))
                .unwrap_or(UTF_8)
        })
    }

    /// Get the body decoded with [`charset`](Self::charset)
    ///
    /// Malformed sequences become U+FFFD. A byte order mark does not
    /// override the resolved charset.
    pub fn string_body(&self) -> &str {
        self.text.get_or_init(|| {
            let (text, had_errors) = self.charset().decode_without_bom_handling(&self.body);
            if had_errors {
                tracing::debug!(charset = self.charset().name(), "body contained malformed sequences");
            }
            text.into_owned()
        })
    }

    /// Decode the body as JSON
    pub fn decode_json<T: DeserializeOwned>(&self, codec: &JsonCodec) -> Result<T> {
        codec.decode(&self.body)
    }

    /// Decode the string body as XML
    pub fn decode_xml<T: DeserializeOwned>(&self, codec: &XmlCodec) -> Result<T> {
        codec.decode(self.string_body().as_bytes())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("mime_type", &self.mime_type())
            .field("body", &format_args!("{} bytes", self.body.len()))
            .finish()
    }
}

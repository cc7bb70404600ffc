//! httputils - a unified async HTTP client
//!
//! One entry point builds requests of several body encodings, runs them
//! through a shared connection pool and returns a normalized response whose
//! MIME type, charset and decoded body are resolved from its headers.
//!
//! ## Features
//!
//! - **Form, JSON, XML and raw bodies** with charset-aware encoding
//! - **Multipart uploads** from paths, buffers or async readers, with MIME detection
//! - **Bounded connection pool** with total and per-route limits
//! - **Strict timeouts** for pool acquisition, connect, response and body
//! - **Charset resolution** from `Content-Type`, a default table, then UTF-8
//! - **Object codecs** for JSON and XML with null omission and root wrapping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use httputils::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new()?;
//!     let response = client
//!         .post_json("https://example.com/api/offers", r#"{"title":"Engineer"}"#, None)
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     println!("Body: {}", response.string_body());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod error;
pub mod file;
pub mod mimetype;
pub mod multipart;
pub mod pool;
pub mod request;
pub mod response;
pub mod timeout;
pub mod transport;

// Re-export main types for convenience
pub use auth::Credentials;
pub use client::{Client, ClientBuilder};
pub use codec::{JsonCodec, XmlCodec};
pub use error::{DetectionError, Error, Result, TimeoutPhase};
pub use file::{FileSource, KeyedFile, KeyedFileGroup};
pub use mimetype::{CharsetTable, MimeDetector, SniffingDetector};
pub use pool::{ConnectionManager, PoolConfig, Route};
pub use request::{Body, Multipart, Params, Request, RequestBuilder, RequestSpec};
pub use response::Response;
pub use timeout::TimeoutConfig;
pub use transport::{CallState, Dispatcher, HttpTransport, Transport};

// Re-export common HTTP types
pub use http::{HeaderMap, HeaderValue, Method, StatusCode};

// Re-export URL types
pub use url::Url;

// Re-export common traits
pub use async_trait::async_trait;

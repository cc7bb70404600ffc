use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};

use crate::error::Result;

/// Client-level credentials
///
/// Rendered as a default `Authorization` header, so a caller header of the
/// same name overrides them for a single call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Basic authentication
    Basic { username: String, password: String },
    /// Bearer token authentication
    Bearer { token: String },
}

impl Credentials {
    /// Create basic credentials
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Create bearer credentials
    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    /// Read credentials from `HTTP_BEARER_TOKEN`, or else from
    /// `HTTP_USERNAME` and `HTTP_PASSWORD`
    pub fn from_env() -> Option<Self> {
        if let Ok(token) = std::env::var("HTTP_BEARER_TOKEN") {
            return Some(Self::bearer(token));
        }
        match (std::env::var("HTTP_USERNAME"), std::env::var("HTTP_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(Self::basic(username, password)),
            _ => None,
        }
    }

    /// Get the authorization header value
    pub fn authorization(&self) -> String {
        match self {
            Credentials::Basic { username, password } => {
                let encoded = BASE64.encode(format!("{}:{}", username, password));
                format!("Basic {}", encoded)
            }
            Credentials::Bearer { token } => format!("Bearer {}", token),
        }
    }

    /// Apply the credentials to a default header map
    pub fn apply_to_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        let mut value = HeaderValue::from_str(&self.authorization())?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

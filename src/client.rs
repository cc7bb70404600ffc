use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use serde::Serialize;

use crate::auth::Credentials;
use crate::codec::{JsonCodec, XmlCodec};
use crate::error::Result;
use crate::mimetype::{CharsetTable, MimeDetector, SniffingDetector};
use crate::pool::{ConnectionManager, PoolConfig};
use crate::request::{Multipart, Params, Request, RequestBuilder, RequestSpec};
use crate::response::Response;
use crate::timeout::TimeoutConfig;
use crate::transport::{Dispatcher, Transport};

/// Default `User-Agent` sent by every client
pub const DEFAULT_USER_AGENT: &str = concat!("httputils/", env!("CARGO_PKG_VERSION"));

/// Main HTTP client
///
/// Built once with [`ClientBuilder`] and shared by cloning; clones use the
/// same connection pool. Every operation builds a request, runs it through
/// the pool and returns the drained [`Response`]. A non-success status is a
/// normal response, not an error.
///
/// # Examples
///
/// ```rust,no_run
/// use httputils::{Client, Params};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::builder().user_agent("jobs-sync/2.1")?.build()?;
///     let form = Params::new().with("title", "Engineer").with_opt("team", None::<String>);
///     let response = client.post_form("https://example.com/jobs", &form, None).await?;
///     println!("{} {}", response.status(), response.string_body());
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    builder: Arc<RequestBuilder>,
    dispatcher: Dispatcher,
}

impl Client {
    /// Create a client with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a new client builder
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the request builder used by this client
    pub fn request_builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Get the connection pool
    pub fn pool(&self) -> &ConnectionManager {
        self.dispatcher.pool()
    }

    /// Send an already built request
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.dispatcher.execute(request).await
    }

    /// Build and send any request specification
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Response> {
        let request = self.builder.build(spec).await?;
        self.send(request).await
    }

    /// Send a GET request
    pub async fn get(
        &self,
        uri: &str,
        query: Option<&Params>,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let request = self.builder.build_get(uri, query, headers).await?;
        self.send(request).await
    }

    /// POST a URL-encoded form
    pub async fn post_form(
        &self,
        uri: &str,
        params: &Params,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let request = self.builder.build_form(uri, params, headers).await?;
        self.send(request).await
    }

    /// POST JSON text
    pub async fn post_json(
        &self,
        uri: &str,
        json: &str,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let request = self.builder.build_json(uri, json, headers).await?;
        self.send(request).await
    }

    /// POST XML text
    pub async fn post_xml(
        &self,
        uri: &str,
        xml: &str,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let request = self.builder.build_xml(uri, xml, headers).await?;
        self.send(request).await
    }

    /// POST text under a caller-chosen content type
    pub async fn post_raw(
        &self,
        uri: &str,
        content: &str,
        content_type: &str,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let request = self
            .builder
            .build_raw(uri, content, content_type, headers)
            .await?;
        self.send(request).await
    }

    /// POST a multipart form
    pub async fn post_multipart(
        &self,
        uri: &str,
        multipart: Multipart,
        query: Option<&Params>,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let request = self
            .builder
            .build_multipart(uri, multipart, query, headers)
            .await?;
        self.send(request).await
    }

    /// Serialize a value with `codec` and POST it as JSON
    pub async fn post_json_object<T: Serialize>(
        &self,
        uri: &str,
        value: &T,
        codec: &JsonCodec,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let json = codec.encode_to_string(value)?;
        self.post_json(uri, &json, headers).await
    }

    /// Serialize a value with `codec` and POST it as XML
    pub async fn post_xml_object<T: Serialize>(
        &self,
        uri: &str,
        value: &T,
        codec: &XmlCodec,
        headers: Option<&Params>,
    ) -> Result<Response> {
        let xml = codec.encode_to_string(value)?;
        self.post_xml(uri, &xml, headers).await
    }
}

/// Builder for creating HTTP clients with custom configuration
///
/// # Examples
///
/// ```rust
/// use httputils::{ClientBuilder, Credentials};
/// use std::time::Duration;
///
/// let client = ClientBuilder::new()
///     .max_per_route(8)
///     .response_timeout(Duration::from_secs(30))
///     .credentials(Credentials::bearer("s3cr3t"))
///     .build()
///     .unwrap();
/// assert_eq!(client.pool().config().max_per_route, 8);
/// ```
pub struct ClientBuilder {
    pool: PoolConfig,
    default_headers: HeaderMap,
    credentials: Option<Credentials>,
    detector: Arc<dyn MimeDetector>,
    charsets: CharsetTable,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        Self {
            pool: PoolConfig::default(),
            default_headers,
            credentials: None,
            detector: Arc::new(SniffingDetector::new()),
            charsets: CharsetTable::standard(),
            transport: None,
        }
    }

    /// Set the whole pool configuration
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

    /// Set the total connection limit
    pub fn max_total(mut self, max: usize) -> Self {
        self.pool.max_total = max;
        self
    }

    /// Set the per-route connection limit
    pub fn max_per_route(mut self, max: usize) -> Self {
        self.pool.max_per_route = max;
        self
    }

    /// Set all timeouts
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.pool.timeouts = timeouts;
        self
    }

    /// Set the connection and pool acquisition timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.pool.timeouts.connect_timeout = timeout;
        self
    }

    /// Set the response timeout
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.pool.timeouts.response_timeout = timeout;
        self
    }

    /// Set the pool idle timeout
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool.timeouts.pool_idle_timeout = timeout;
        self
    }

    /// Set a default header for all requests
    pub fn default_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = name.parse::<HeaderName>()?;
        let value = value.parse::<HeaderValue>()?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Set the user agent
    pub fn user_agent(self, user_agent: &str) -> Result<Self> {
        self.default_header("User-Agent", user_agent)
    }

    /// Set client-level credentials
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the MIME detector for file parts without a declared type
    pub fn detector(mut self, detector: impl MimeDetector + 'static) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    /// Set the default charsets used to decode responses
    pub fn charset_table(mut self, charsets: CharsetTable) -> Self {
        self.charsets = charsets;
        self
    }

    /// Replace the transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    ///
    /// Fails with [`Error::Config`](crate::Error::Config) on unusable pool
    /// limits and [`Error::InvalidRequest`](crate::Error::InvalidRequest)
    /// when the credentials cannot be sent as a header.
    pub fn build(self) -> Result<Client> {
        let mut default_headers = self.default_headers;
        if let Some(credentials) = &self.credentials {
            credentials.apply_to_headers(&mut default_headers)?;
        }

        let pool = Arc::new(ConnectionManager::new(self.pool)?);
        let charsets = Arc::new(self.charsets);
        let dispatcher = match self.transport {
            Some(transport) => Dispatcher::with_transport(pool, transport, charsets),
            None => Dispatcher::new(pool, charsets),
        };

        let config = dispatcher.pool().config();
        tracing::debug!(
            max_total = config.max_total,
            max_per_route = config.max_per_route,
            "client built"
        );

        Ok(Client {
            builder: Arc::new(RequestBuilder::new(self.detector, default_headers)),
            dispatcher,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileSource;
    use crate::multipart::tests::parse;
    use crate::request::FORM_CONTENT_TYPE;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, Request as MockRequest, Respond, ResponseTemplate};

    /// Sends the request body back with the request's content type
    struct Echo;

    impl Respond for Echo {
        fn respond(&self, request: &MockRequest) -> ResponseTemplate {
            let content_type = request
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            ResponseTemplate::new(200).set_body_raw(request.body.clone(), &content_type)
        }
    }

    async fn echo_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .respond_with(Echo)
            .mount(&server)
            .await;
        server
    }

    fn client() -> Client {
        Client::builder()
            .timeouts(TimeoutConfig::quick())
            .build()
            .unwrap()
    }

    #[test]
    fn test_client_builder() {
        let client = ClientBuilder::new()
            .max_total(10)
            .max_per_route(5)
            .user_agent("Test/1.0")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(client.pool().config().max_total, 10);
        assert_eq!(
            client.request_builder().default_headers().get(USER_AGENT).unwrap(),
            "Test/1.0"
        );
    }

    #[test]
    fn test_invalid_pool_config_is_rejected() {
        let err = ClientBuilder::new().max_per_route(0).build().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[tokio::test]
    async fn test_post_json_echo() {
        let server = echo_server().await;
        let response = client()
            .post_json(&format!("{}/echo", server.uri()), r#"{"a":1}"#, None)
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.mime_type(), "application/json");
        assert_eq!(response.charset(), encoding_rs::UTF_8);
        assert_eq!(response.string_body(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_post_form_drops_nulls_and_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/form"))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .and(body_string("a=1&c=3"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let form = Params::new()
            .with("a", "1")
            .with_opt("b", None::<String>)
            .with("c", "3");
        let response = client()
            .post_form(&format!("{}/form", server.uri()), &form, None)
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
    }

    #[tokio::test]
    async fn test_get_with_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "café au lait"))
            .respond_with(ResponseTemplate::new(200).set_body_string("found"))
            .mount(&server)
            .await;

        let query = Params::new().with("q", "café au lait").with_opt("page", None::<String>);
        let response = client()
            .get(&format!("{}/search", server.uri()), Some(&query), None)
            .await
            .unwrap();
        assert_eq!(response.string_body(), "found");
    }

    #[tokio::test]
    async fn test_multipart_round_trip() {
        let server = echo_server().await;
        let png: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        let multipart = Multipart::new()
            .file("avatar", FileSource::from_bytes("me.png", png))
            .text("name", "Ada");

        let response = client()
            .post_multipart(&format!("{}/echo", server.uri()), multipart, None, None)
            .await
            .unwrap();

        let boundary = response
            .content_type()
            .and_then(|m| m.get_param(mime::BOUNDARY))
            .map(|b| b.as_str().to_string())
            .unwrap();
        let parts = parse(response.body(), &boundary);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, "avatar");
        assert_eq!(parts[0].1.as_deref(), Some("me.png"));
        assert_eq!(parts[0].2.as_deref(), Some("image/png"));
        assert_eq!(parts[0].3, png);
        assert_eq!(parts[1].0, "name");
        assert_eq!(parts[1].3, b"Ada");
    }

    #[tokio::test]
    async fn test_credentials_and_per_call_override() {
        let server = MockServer::start().await;
        Mock::given(path("/secure"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(path("/secure"))
            .and(header("authorization", "Bearer override"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let client = Client::builder()
            .timeouts(TimeoutConfig::quick())
            .credentials(Credentials::basic("user", "pass"))
            .build()
            .unwrap();
        let uri = format!("{}/secure", server.uri());

        let default = client.get(&uri, None, None).await.unwrap();
        assert_eq!(default.status().as_u16(), 200);

        let headers = Params::new().with("Authorization", "Bearer override");
        let overridden = client.get(&uri, None, Some(&headers)).await.unwrap();
        assert_eq!(overridden.status().as_u16(), 202);
    }

    #[tokio::test]
    async fn test_execute_arbitrary_method() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/jobs/7"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let spec = RequestSpec::new(http::Method::DELETE, format!("{}/jobs/7", server.uri()));
        let response = client().execute(&spec).await.unwrap();
        assert_eq!(response.status().as_u16(), 204);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_post_json_object_and_decode() {
        #[derive(Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Offer {
            id: u32,
            note: Option<String>,
        }

        let server = echo_server().await;
        let codec = JsonCodec::new().omit_nulls(true).root_value(true);
        let offer = Offer { id: 9, note: None };

        let response = client()
            .post_json_object(&format!("{}/echo", server.uri()), &offer, &codec, None)
            .await
            .unwrap();
        assert_eq!(response.string_body(), r#"{"Offer":{"id":9}}"#);
        assert_eq!(response.decode_json::<Offer>(&codec).unwrap(), offer);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = client();
        let err = client
            .post_json(&format!("http://127.0.0.1:{}/echo", port), "{}", None)
            .await
            .unwrap_err();
        assert!(err.is_transport() || err.is_timeout());
        assert_eq!(client.pool().in_use(), 0);
    }

    #[tokio::test]
    async fn test_bad_uri_fails_before_network() {
        let err = client().get("not a uri", None, None).await.unwrap_err();
        assert!(err.is_uri());
        assert_eq!(client().pool().in_use(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_pool() {
        let client = client();
        let clone = client.clone();
        assert!(std::ptr::eq(client.pool(), clone.pool()));
    }
}

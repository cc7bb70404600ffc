use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Request as ReqwestRequest, Response as ReqwestResponse};

use crate::error::{Error, Result, TimeoutPhase};
use crate::mimetype::CharsetTable;
use crate::pool::{Connection, ConnectionManager, Route};
use crate::request::Request;
use crate::response::Response;
use crate::timeout::TimeoutConfig;

/// Transport trait for HTTP operations
///
/// Sends one request over a leased connection and returns once the status
/// line and headers are in. The body is drained by the [`Dispatcher`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the response head
    async fn send(&self, connection: &Connection, request: ReqwestRequest) -> Result<ReqwestResponse>;

    /// Get the transport name/type
    fn name(&self) -> &str;
}

/// Default HTTP transport implementation using reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeouts: TimeoutConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self { timeouts }
    }

    /// Get the timeout configuration
    pub fn timeout_config(&self) -> &TimeoutConfig {
        &self.timeouts
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, connection: &Connection, request: ReqwestRequest) -> Result<ReqwestResponse> {
        connection
            .client()
            .execute(request)
            .await
            .map_err(|e| classify(e, &self.timeouts, TimeoutPhase::Response))
    }

    fn name(&self) -> &str {
        "HTTP/1.1"
    }
}

/// Map a reqwest failure onto the crate error
fn classify(err: reqwest::Error, timeouts: &TimeoutConfig, phase: TimeoutPhase) -> Error {
    if err.is_timeout() && err.is_connect() {
        Error::timeout(TimeoutPhase::Connect, timeouts.connect_timeout)
    } else if err.is_timeout() {
        Error::timeout(phase, timeouts.response_timeout)
    } else {
        Error::Transport(err)
    }
}

/// Where a call is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Built,
    Sent,
    HeadersReceived,
    BodyDrained,
    Closed,
    Errored,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            CallState::Built => "built",
            CallState::Sent => "sent",
            CallState::HeadersReceived => "headers-received",
            CallState::BodyDrained => "body-drained",
            CallState::Closed => "closed",
            CallState::Errored => "errored",
        };
        f.write_str(state)
    }
}

/// Per-call state tracker
struct Call {
    id: u64,
    state: CallState,
}

impl Call {
    fn advance(&mut self, next: CallState) {
        tracing::debug!(id = self.id, from = %self.state, to = %next, "call state");
        self.state = next;
    }
}

/// Runs one request/response exchange over a pooled connection
///
/// Every path, including errors and a dropped future, gives the
/// connection back to the pool. Any status code yields a [`Response`];
/// only transport failures and timeouts are errors.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<ConnectionManager>,
    transport: Arc<dyn Transport>,
    charsets: Arc<CharsetTable>,
}

impl Dispatcher {
    /// Create a dispatcher sending through reqwest
    pub fn new(pool: Arc<ConnectionManager>, charsets: Arc<CharsetTable>) -> Self {
        let transport = Arc::new(HttpTransport::new(pool.config().timeouts.clone()));
        Self::with_transport(pool, transport, charsets)
    }

    /// Create a dispatcher with a custom transport
    pub fn with_transport(
        pool: Arc<ConnectionManager>,
        transport: Arc<dyn Transport>,
        charsets: Arc<CharsetTable>,
    ) -> Self {
        Self {
            pool,
            transport,
            charsets,
        }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Arc<ConnectionManager> {
        &self.pool
    }

    /// Execute a built request
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let route = Route::from_url(request.url())?;
        let connection = self.pool.acquire(&route).await?;
        let mut call = Call {
            id: connection.id(),
            state: CallState::Built,
        };

        let method = request.method().clone();
        let url = request.url().clone();
        let result = self.round_trip(&connection, request, &mut call).await;
        self.pool.release(connection);

        match result {
            Ok(response) => {
                call.advance(CallState::Closed);
                if !response.is_success() {
                    tracing::warn!(
                        %method,
                        url = %url,
                        status = response.status().as_u16(),
                        "non-success status"
                    );
                }
                Ok(response)
            }
            Err(err) => {
                call.advance(CallState::Errored);
                tracing::warn!(%method, url = %url, error = %err, "request failed");
                Err(err)
            }
        }
    }

    async fn round_trip(
        &self,
        connection: &Connection,
        request: Request,
        call: &mut Call,
    ) -> Result<Response> {
        let timeouts = &self.pool.config().timeouts;
        let wait = timeouts.response_timeout;

        tracing::debug!(
            id = call.id,
            route = %connection.route(),
            method = %request.method(),
            url = %request.url(),
            "sending request"
        );
        let request = request.into_reqwest_request(connection.client())?;
        let send = self.transport.send(connection, request);
        call.advance(CallState::Sent);
        let head = tokio::time::timeout(wait, send)
            .await
            .map_err(|_| Error::timeout(TimeoutPhase::Response, wait))??;
        call.advance(CallState::HeadersReceived);

        let status = head.status();
        let headers = collect_headers(head.headers());
        let body: Bytes = tokio::time::timeout(wait, head.bytes())
            .await
            .map_err(|_| Error::timeout(TimeoutPhase::BodyRead, wait))?
            .map_err(|e| classify(e, timeouts, TimeoutPhase::BodyRead))?;
        call.advance(CallState::BodyDrained);

        tracing::debug!(id = call.id, status = status.as_u16(), bytes = body.len(), "response received");
        Ok(Response::from_wire(status, headers, body, self.charsets.clone()))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.pool)
            .field("transport", &self.transport.name())
            .finish()
    }
}

/// Flatten a header map
///
/// Values of a repeated name keep their order but are grouped together.
fn collect_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = match value.to_str() {
                Ok(v) => v.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

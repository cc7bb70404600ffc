//! Connection pool with total and per-route limits.
//!
//! Sockets are kept alive by the shared `reqwest::Client`; this module
//! bounds how many calls may use them at once. A [`Connection`] holds one
//! per-route permit and one total permit and gives both back when it is
//! released or dropped. A route's entry lives only while some connection
//! or waiter uses it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::error::{Error, Result, TimeoutPhase};
use crate::timeout::TimeoutConfig;

/// Configuration for a connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections in use across every route
    pub max_total: usize,
    /// Connections in use to a single route
    pub max_per_route: usize,
    /// Connect, response and idle bounds
    pub timeouts: TimeoutConfig,
}

impl PoolConfig {
    /// Set the total connection limit
    pub fn max_total(mut self, max: usize) -> Self {
        self.max_total = max;
        self
    }

    /// Set the per-route connection limit
    pub fn max_per_route(mut self, max: usize) -> Self {
        self.max_per_route = max;
        self
    }

    /// Set the timeouts
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Check the limits are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_total == 0 || self.max_per_route == 0 {
            return Err(Error::config("pool limits must be greater than zero"));
        }
        if self.max_per_route > self.max_total {
            return Err(Error::config(format!(
                "max_per_route ({}) exceeds max_total ({})",
                self.max_per_route, self.max_total
            )));
        }
        if self.max_total > Semaphore::MAX_PERMITS {
            return Err(Error::config("max_total is too large"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 256,
            max_per_route: 128,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Pool key: where a connection goes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Route {
    /// Derive the route of a URL, filling in the scheme's default port
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::uri(format!("{} has no host", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::uri(format!("{} has no port", url)))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

type RouteTable = Arc<Mutex<HashMap<Route, Arc<Semaphore>>>>;

/// Drop the entry for `route` if nothing holds or waits on it
fn prune_idle(routes: &Mutex<HashMap<Route, Arc<Semaphore>>>, route: &Route, capacity: usize) {
    let Ok(mut routes) = routes.lock() else {
        return;
    };
    let idle = routes
        .get(route)
        .is_some_and(|s| Arc::strong_count(s) == 1 && s.available_permits() == capacity);
    if idle {
        routes.remove(route);
        tracing::trace!(route = %route, tracked = routes.len(), "idle route dropped");
    }
}

/// A leased slot on a route
///
/// Exclusive to one call while held.
pub struct Connection {
    id: u64,
    route: Route,
    client: reqwest::Client,
    route_permit: Option<OwnedSemaphorePermit>,
    total_permit: Option<OwnedSemaphorePermit>,
    routes: RouteTable,
    max_per_route: usize,
}

impl Connection {
    /// Lease identifier, for logs
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Route this connection serves
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Socket pool to send on
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("route", &self.route)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.route_permit.take();
        self.total_permit.take();
        prune_idle(&self.routes, &self.route, self.max_per_route);
        tracing::debug!(id = self.id, route = %self.route, "connection released");
    }
}

/// Hands out [`Connection`]s within the configured limits
pub struct ConnectionManager {
    config: PoolConfig,
    client: reqwest::Client,
    total: Arc<Semaphore>,
    routes: RouteTable,
    next_id: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager and its underlying socket pool
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect_timeout)
            .pool_idle_timeout(config.timeouts.pool_idle_timeout)
            .pool_max_idle_per_host(config.max_per_route)
            .build()
            .map_err(|e| Error::config(format!("failed to build socket pool: {}", e)))?;
        Ok(Self::with_client(config, client))
    }

    fn with_client(config: PoolConfig, client: reqwest::Client) -> Self {
        Self {
            total: Arc::new(Semaphore::new(config.max_total)),
            config,
            client,
            routes: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lease a connection to `route`
    ///
    /// Waits at most `connect_timeout` for both a route slot and a total
    /// slot; a timeout leaves nothing held.
    pub async fn acquire(&self, route: &Route) -> Result<Connection> {
        let route_limit = self.route_semaphore(route)?;
        let total = self.total.clone();
        let wait = self.config.timeouts.connect_timeout;

        let permits = tokio::time::timeout(wait, async move {
            let route_permit = route_limit.acquire_owned().await?;
            let total_permit = total.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>((route_permit, total_permit))
        })
        .await;

        let (route_permit, total_permit) = match permits {
            Ok(Ok(permits)) => permits,
            Ok(Err(_)) => {
                prune_idle(&self.routes, route, self.config.max_per_route);
                return Err(Error::config("connection pool is closed"));
            }
            Err(_) => {
                prune_idle(&self.routes, route, self.config.max_per_route);
                tracing::warn!(route = %route, ?wait, "timed out waiting for a pooled connection");
                return Err(Error::timeout(TimeoutPhase::PoolAcquire, wait));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, route = %route, in_use = self.in_use(), "connection acquired");
        Ok(Connection {
            id,
            route: route.clone(),
            client: self.client.clone(),
            route_permit: Some(route_permit),
            total_permit: Some(total_permit),
            routes: self.routes.clone(),
            max_per_route: self.config.max_per_route,
        })
    }

    /// Give a connection back
    pub fn release(&self, connection: Connection) {
        drop(connection);
    }

    /// Connections currently leased
    pub fn in_use(&self) -> usize {
        self.config.max_total - self.total.available_permits()
    }

    /// Connections currently leased to `route`
    pub fn in_use_on(&self, route: &Route) -> usize {
        self.routes
            .lock()
            .ok()
            .and_then(|routes| {
                routes
                    .get(route)
                    .map(|s| self.config.max_per_route - s.available_permits())
            })
            .unwrap_or(0)
    }

    /// Routes with a connection in use or a caller waiting
    pub fn routes_tracked(&self) -> usize {
        self.routes.lock().map(|routes| routes.len()).unwrap_or(0)
    }

    fn route_semaphore(&self, route: &Route) -> Result<Arc<Semaphore>> {
        let mut routes = self
            .routes
            .lock()
            .map_err(|_| Error::config("route table lock poisoned"))?;
        Ok(routes
            .entry(route.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_per_route)))
            .clone())
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("in_use", &self.in_use())
            .field("routes", &self.routes_tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn route(host: &str) -> Route {
        Route::from_url(&Url::parse(&format!("http://{}/", host)).unwrap()).unwrap()
    }

    fn manager(max_total: usize, max_per_route: usize, connect: Duration) -> ConnectionManager {
        let config = PoolConfig::default()
            .max_total(max_total)
            .max_per_route(max_per_route)
            .timeouts(TimeoutConfig::default().connect_timeout(connect));
        ConnectionManager::new(config).unwrap()
    }

    #[test]
    fn test_route_from_url() {
        let r = Route::from_url(&Url::parse("https://api.example.com/v1").unwrap()).unwrap();
        assert_eq!(r.port, 443);
        assert_eq!(r.to_string(), "https://api.example.com:443");

        let explicit = Route::from_url(&Url::parse("http://localhost:8080/").unwrap()).unwrap();
        assert_eq!(explicit.port, 8080);
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        let err = PoolConfig::default().max_per_route(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(PoolConfig::default().max_total(2).max_per_route(4).validate().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{"max_per_route": 4}"#).unwrap();
        assert_eq!(config.max_per_route, 4);
        assert_eq!(config.max_total, 256);
        assert_eq!(config.timeouts, TimeoutConfig::default());
    }

    #[tokio::test]
    async fn test_exhausted_route_blocks_until_release() {
        let pool = Arc::new(manager(4, 1, Duration::from_secs(5)));
        let r = route("one.test");

        let first = pool.acquire(&r).await.unwrap();
        assert_eq!(pool.in_use(), 1);

        let waiter = {
            let pool = pool.clone();
            let r = r.clone();
            tokio::spawn(async move { pool.acquire(&r).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        pool.release(first);
        let second = waiter.await.unwrap().unwrap();
        assert_eq!(second.route(), &r);
        assert_eq!(pool.in_use_on(&r), 1);
    }

    #[tokio::test]
    async fn test_waiter_is_woken_on_release() {
        let pool = manager(4, 1, Duration::from_secs(5));
        let r = route("wake.test");

        let held = pool.acquire(&r).await.unwrap();
        let mut waiting = tokio_test::task::spawn(pool.acquire(&r));
        tokio_test::assert_pending!(waiting.poll());

        pool.release(held);
        assert!(waiting.is_woken());
        let connection = tokio_test::assert_ready_ok!(waiting.poll());
        assert_eq!(connection.route(), &r);
    }

    #[tokio::test]
    async fn test_exhausted_route_times_out() {
        let pool = manager(4, 1, Duration::from_millis(50));
        let r = route("two.test");

        let held = pool.acquire(&r).await.unwrap();
        let err = pool.acquire(&r).await.unwrap_err();
        assert_eq!(err.timeout_phase(), Some(TimeoutPhase::PoolAcquire));
        // The failed attempt holds nothing.
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.routes_tracked(), 1);

        pool.release(held);
        assert_eq!(pool.routes_tracked(), 0);
    }

    #[tokio::test]
    async fn test_route_table_does_not_grow_with_hosts() {
        let pool = manager(8, 2, Duration::from_millis(50));
        for i in 0..200 {
            let connection = pool.acquire(&route(&format!("host{}.test", i))).await.unwrap();
            assert_eq!(pool.routes_tracked(), 1);
            pool.release(connection);
        }
        assert_eq!(pool.routes_tracked(), 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn test_busy_route_keeps_its_entry() {
        let pool = manager(4, 2, Duration::from_millis(50));
        let a = pool.acquire(&route("a.test")).await.unwrap();
        let b1 = pool.acquire(&route("b.test")).await.unwrap();
        let b2 = pool.acquire(&route("b.test")).await.unwrap();
        assert_eq!(pool.routes_tracked(), 2);

        pool.release(b1);
        assert_eq!(pool.routes_tracked(), 2);
        assert_eq!(pool.in_use_on(&route("b.test")), 1);

        pool.release(b2);
        assert_eq!(pool.routes_tracked(), 1);
        pool.release(a);
        assert_eq!(pool.routes_tracked(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_route_entry() {
        let pool = manager(4, 1, Duration::from_secs(5));
        let r = route("queued.test");

        let held = pool.acquire(&r).await.unwrap();
        let mut waiting = tokio_test::task::spawn(pool.acquire(&r));
        tokio_test::assert_pending!(waiting.poll());

        pool.release(held);
        assert_eq!(pool.routes_tracked(), 1);
        let connection = tokio_test::assert_ready_ok!(waiting.poll());
        assert_eq!(pool.in_use_on(&r), 1);

        drop(connection);
        assert_eq!(pool.routes_tracked(), 0);
    }

    #[tokio::test]
    async fn test_other_routes_unaffected() {
        let pool = manager(4, 1, Duration::from_millis(50));
        let _a = pool.acquire(&route("a.test")).await.unwrap();
        let _b = pool.acquire(&route("b.test")).await.unwrap();
        assert_eq!(pool.in_use(), 2);
    }

    #[tokio::test]
    async fn test_total_limit_applies_across_routes() {
        let pool = manager(1, 1, Duration::from_millis(50));
        let _a = pool.acquire(&route("a.test")).await.unwrap();
        let err = pool.acquire(&route("b.test")).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(pool.in_use_on(&route("b.test")), 0);
    }

    #[tokio::test]
    async fn test_dropping_connection_releases_permits() {
        let pool = manager(2, 2, Duration::from_millis(50));
        {
            let _c = pool.acquire(&route("drop.test")).await.unwrap();
            assert_eq!(pool.in_use(), 1);
        }
        assert_eq!(pool.in_use(), 0);
    }
}

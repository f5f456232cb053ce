use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};
use zeronet_common::protocol::error::{Result, ZeroError};
use zeronet_common::transport::{Connector, FrameTransport, TcpConnector};

/// Connection pool configuration.
///
/// # Default Configuration
///
/// - `max_sockets_per_station`: 16
/// - `acquire_timeout_ms`: 5000 (5 seconds)
/// - `connect_timeout_ms`: 3000 (3 seconds)
///
/// # Example
///
/// ```rust
/// use zeronet_client::PoolConfig;
///
/// let config = PoolConfig {
///     max_sockets_per_station: 4,
///     ..Default::default()
/// };
/// assert_eq!(config.acquire_timeout_ms, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of sockets (borrowed plus idle) per station
    pub max_sockets_per_station: usize,
    /// Maximum time to wait for a free socket slot in milliseconds
    pub acquire_timeout_ms: u64,
    /// Maximum time to establish a new connection in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sockets_per_station: 16,
            acquire_timeout_ms: 5000,
            connect_timeout_ms: 3000,
        }
    }
}

/// Maps a station name to the endpoint its requests go to.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve(&self, station: &str) -> Option<String>;
}

/// Resolver over a fixed station → endpoint table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    endpoints: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_station(mut self, station: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.endpoints
            .insert(station.into().to_lowercase(), endpoint.into());
        self
    }
}

#[async_trait]
impl EndpointResolver for StaticResolver {
    async fn resolve(&self, station: &str) -> Option<String> {
        self.endpoints.get(&station.to_lowercase()).cloned()
    }
}

struct IdleSocket {
    transport: Box<dyn FrameTransport>,
    affinity: Option<String>,
}

struct StationSlot {
    permits: Arc<Semaphore>,
    idle: Vec<IdleSocket>,
}

struct PoolInner {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn EndpointResolver>,
    stations: Mutex<HashMap<String, StationSlot>>,
    closed: AtomicBool,
}

impl PoolInner {
    fn release(&self, station: &str, socket: IdleSocket) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut stations = self.stations.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = stations.get_mut(station) {
            slot.idle.push(socket);
        }
    }
}

/// A socket borrowed from the [`ConnectionPool`].
///
/// Returned to the pool when dropped, unless it was marked failed: the wire
/// protocol cannot resynchronize a stream after a protocol error, so a
/// tainted socket is closed instead.
pub struct PooledSocket {
    transport: Option<Box<dyn FrameTransport>>,
    station: String,
    affinity: Option<String>,
    has_failed: bool,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSocket {
    /// Station this socket talks to.
    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn endpoint(&self) -> &str {
        self.transport.as_ref().map(|t| t.endpoint()).unwrap_or_default()
    }

    /// Marks the socket as unusable; it will be closed instead of returned.
    pub fn set_failed(&mut self) {
        self.has_failed = true;
    }

    pub fn has_failed(&self) -> bool {
        self.has_failed
    }

    pub async fn send(&mut self, frames: Vec<Bytes>) -> Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.send_frames(frames).await,
            None => Err(ZeroError::PoolClosed),
        }
    }

    pub async fn recv(&mut self) -> Result<Vec<Bytes>> {
        match self.transport.as_mut() {
            Some(transport) => transport.recv_frames().await,
            None => Err(ZeroError::PoolClosed),
        }
    }
}

impl Drop for PooledSocket {
    fn drop(&mut self) {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => return,
        };
        if self.has_failed {
            debug!(station = %self.station, "discarding failed socket");
            return;
        }
        // Return before the permit is released so a waiting caller finds it
        self.pool.release(
            &self.station,
            IdleSocket {
                transport,
                affinity: self.affinity.take(),
            },
        );
    }
}

/// Pool of request sockets, keyed by station name.
///
/// # Architecture
///
/// - Each station gets its own slot with at most `max_sockets_per_station`
///   sockets, borrowed and idle combined
/// - A borrow prefers an idle socket last used with the same affinity key,
///   then the most recently returned one (LIFO), then opens a new connection
/// - Borrowed sockets are exclusively owned by one caller until dropped
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use zeronet_client::{ConnectionPool, PoolConfig, StaticResolver};
///
/// # #[tokio::main]
/// # async fn main() -> zeronet_common::Result<()> {
/// let resolver = StaticResolver::new().with_station("UserCenter", "tcp://127.0.0.1:8101");
/// let pool = ConnectionPool::new(PoolConfig::default(), Arc::new(resolver));
///
/// let mut socket = pool.acquire("UserCenter", Some("req-1")).await?;
/// // use the socket; dropping it returns it to the pool
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a pool that connects over TCP.
    pub fn new(config: PoolConfig, resolver: Arc<dyn EndpointResolver>) -> Self {
        let connector = Arc::new(TcpConnector::new(Duration::from_millis(
            config.connect_timeout_ms,
        )));
        Self::with_connector(config, resolver, connector)
    }

    /// Creates a pool with a custom connector.
    pub fn with_connector(
        config: PoolConfig,
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                connector,
                resolver,
                stations: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    fn station_key(station: &str) -> String {
        station.to_lowercase()
    }

    /// Borrows a socket for a station.
    ///
    /// # Errors
    ///
    /// - [`ZeroError::PoolClosed`] after [`close`](Self::close)
    /// - [`ZeroError::Timeout`] if every slot stayed borrowed for
    ///   `acquire_timeout_ms`
    /// - [`ZeroError::StationNotFound`] if the station has no endpoint
    /// - connection errors when a new socket cannot be opened
    pub async fn acquire(&self, station: &str, affinity: Option<&str>) -> Result<PooledSocket> {
        if self.is_closed() {
            return Err(ZeroError::PoolClosed);
        }
        let key = Self::station_key(station);

        let permits = {
            let mut stations = self.inner.stations.lock().unwrap_or_else(|e| e.into_inner());
            stations
                .entry(key.clone())
                .or_insert_with(|| StationSlot {
                    permits: Arc::new(Semaphore::new(self.inner.config.max_sockets_per_station)),
                    idle: Vec::new(),
                })
                .permits
                .clone()
        };

        let timeout = Duration::from_millis(self.inner.config.acquire_timeout_ms);
        let permit = match tokio::time::timeout(timeout, permits.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ZeroError::PoolClosed),
            Err(_) => return Err(ZeroError::Timeout(self.inner.config.acquire_timeout_ms)),
        };

        let reused = {
            let mut stations = self.inner.stations.lock().unwrap_or_else(|e| e.into_inner());
            stations.get_mut(&key).and_then(|slot| {
                let position = affinity
                    .and_then(|a| slot.idle.iter().rposition(|s| s.affinity.as_deref() == Some(a)))
                    .or_else(|| slot.idle.len().checked_sub(1));
                position.map(|p| slot.idle.remove(p))
            })
        };

        let transport = match reused {
            Some(idle) => idle.transport,
            None => {
                let endpoint = self
                    .inner
                    .resolver
                    .resolve(station)
                    .await
                    .ok_or_else(|| ZeroError::StationNotFound(station.to_string()))?;
                debug!(station, endpoint = %endpoint, "opening socket");
                self.inner.connector.connect(&endpoint).await?
            }
        };

        Ok(PooledSocket {
            transport: Some(transport),
            station: key,
            affinity: affinity.map(str::to_string),
            has_failed: false,
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Borrows a socket, folding every failure into "no socket available".
    pub async fn get_socket(&self, station: &str, affinity: Option<&str>) -> Option<PooledSocket> {
        match self.acquire(station, affinity).await {
            Ok(socket) => Some(socket),
            Err(e) => {
                warn!(station, error = %e, "no socket available");
                None
            }
        }
    }

    /// Number of idle sockets held for a station.
    pub fn idle_count(&self, station: &str) -> usize {
        let stations = self.inner.stations.lock().unwrap_or_else(|e| e.into_inner());
        stations
            .get(&Self::station_key(station))
            .map(|slot| slot.idle.len())
            .unwrap_or(0)
    }

    /// Closes every idle socket of a station, e.g. after its address changed.
    pub fn invalidate(&self, station: &str) {
        let mut stations = self.inner.stations.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = stations.get_mut(&Self::station_key(station)) {
            slot.idle.clear();
        }
    }

    /// Stops the pool: idle sockets are closed, borrowed ones are closed when
    /// dropped, and further borrows fail with [`ZeroError::PoolClosed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut stations = self.inner.stations.lock().unwrap_or_else(|e| e.into_inner());
        for slot in stations.values_mut() {
            slot.permits.close();
            slot.idle.clear();
        }
        debug!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

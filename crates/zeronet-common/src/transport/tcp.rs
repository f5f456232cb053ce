use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use crate::protocol::error::{Result, ZeroError};
use crate::transport::codec::MultipartCodec;

/// Default timeout for establishing a TCP connection (3 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A bidirectional multipart message channel.
///
/// This is the request socket an RPC call borrows from the pool. Messages
/// are whole: a send either writes every frame or fails.
#[async_trait]
pub trait FrameTransport: Send {
    /// Sends one multipart message.
    async fn send_frames(&mut self, frames: Vec<Bytes>) -> Result<()>;

    /// Receives one multipart message.
    ///
    /// # Errors
    ///
    /// Returns [`ZeroError::Connection`] when the peer closed the connection.
    async fn recv_frames(&mut self) -> Result<Vec<Bytes>>;

    /// The endpoint this transport is connected to.
    fn endpoint(&self) -> &str;
}

/// Opens transports to endpoints.
///
/// The seam between the connection pool and the network.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FrameTransport>>;
}

/// Strips an optional `tcp://` scheme from an endpoint.
///
/// # Example
///
/// ```
/// use zeronet_common::transport::tcp::socket_address;
///
/// assert_eq!(socket_address("tcp://127.0.0.1:8000"), "127.0.0.1:8000");
/// assert_eq!(socket_address("127.0.0.1:8000"), "127.0.0.1:8000");
/// ```
pub fn socket_address(endpoint: &str) -> &str {
    endpoint.strip_prefix("tcp://").unwrap_or(endpoint)
}

/// Multipart transport over a TCP stream.
///
/// # Example
///
/// ```no_run
/// use bytes::Bytes;
/// use zeronet_common::transport::{FrameTransport, TcpFrameTransport};
///
/// # #[tokio::main]
/// # async fn main() -> zeronet_common::Result<()> {
/// let mut transport = TcpFrameTransport::connect("tcp://127.0.0.1:8000").await?;
/// transport.send_frames(vec![Bytes::from_static(b"hello")]).await?;
/// let reply = transport.recv_frames().await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpFrameTransport {
    framed: Framed<TcpStream, MultipartCodec>,
    endpoint: String,
}

impl TcpFrameTransport {
    /// Connects with [`DEFAULT_CONNECT_TIMEOUT`].
    pub async fn connect(endpoint: &str) -> Result<Self> {
        Self::connect_timeout(endpoint, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connects to an endpoint, failing after `timeout`.
    pub async fn connect_timeout(endpoint: &str, timeout: Duration) -> Result<Self> {
        let addr = socket_address(endpoint);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ZeroError::Connection(format!(
                    "Failed to connect to {}: {}",
                    endpoint, e
                )));
            }
            Err(_) => return Err(ZeroError::Timeout(timeout.as_millis() as u64)),
        };
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream, endpoint))
    }

    /// Wraps an accepted or already connected stream.
    pub fn from_stream(stream: TcpStream, endpoint: impl Into<String>) -> Self {
        Self {
            framed: Framed::new(stream, MultipartCodec::new()),
            endpoint: endpoint.into(),
        }
    }

    /// Map IO errors to appropriate ZeroError variants
    ///
    /// Converts standard IO errors into domain-specific errors:
    /// - Connection errors -> `Connection`
    /// - Other IO errors -> `Io`
    fn map_error(err: ZeroError, context: &str) -> ZeroError {
        match err {
            ZeroError::Io(e) => match e.kind() {
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::UnexpectedEof => {
                    ZeroError::Connection(format!("{}: Connection lost", context))
                }
                _ => ZeroError::Io(e),
            },
            other => other,
        }
    }
}

#[async_trait]
impl FrameTransport for TcpFrameTransport {
    async fn send_frames(&mut self, frames: Vec<Bytes>) -> Result<()> {
        self.framed
            .send(frames)
            .await
            .map_err(|e| Self::map_error(e, "sending message"))
    }

    async fn recv_frames(&mut self) -> Result<Vec<Bytes>> {
        match self.framed.next().await {
            Some(Ok(frames)) => Ok(frames),
            Some(Err(e)) => Err(Self::map_error(e, "receiving message")),
            None => Err(ZeroError::Connection(format!(
                "{} closed the connection",
                self.endpoint
            ))),
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Opens [`TcpFrameTransport`]s.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FrameTransport>> {
        let transport = TcpFrameTransport::connect_timeout(endpoint, self.connect_timeout).await?;
        Ok(Box::new(transport))
    }
}

/// Accepts multipart connections; the reply side of a request socket.
///
/// Used by the management endpoint of a center and by station fakes.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(endpoint: &str) -> Result<Self> {
        let listener = TcpListener::bind(socket_address(endpoint)).await?;
        Ok(Self { listener })
    }

    /// The bound address, as `tcp://host:port`.
    pub fn endpoint(&self) -> Result<String> {
        Ok(format!("tcp://{}", self.listener.local_addr()?))
    }

    pub async fn accept(&self) -> Result<TcpFrameTransport> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        tracing::debug!(%peer, "accepted connection");
        Ok(TcpFrameTransport::from_stream(stream, peer.to_string()))
    }
}

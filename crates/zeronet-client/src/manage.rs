use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use zeronet_common::auth::ServiceKey;
use zeronet_common::protocol::error::{Result, ZeroError};
use zeronet_common::protocol::{ByteCommand, FrameType, RemoteStatus, WireMessage, ZeroResult};
use zeronet_common::transport::{Connector, TcpConnector};

/// Reply to a management command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub state: RemoteStatus,
    /// Text payload: the `Status` frame, falling back to `ResultText`.
    pub text: Option<String>,
}

impl CommandResult {
    pub fn is_ok(&self) -> bool {
        self.state == RemoteStatus::Ok
    }
}

/// Client for the center's management endpoint.
///
/// Unlike [`ApiClient`](crate::ApiClient) it is not gated on readiness and
/// does not pool: each command opens a connection, sends one request and
/// reads a single reply. It is what the join sequence uses while the
/// application is still starting.
///
/// # Example
///
/// ```rust,no_run
/// use zeronet_client::ManageClient;
///
/// # #[tokio::main]
/// # async fn main() -> zeronet_common::Result<()> {
/// let manage = ManageClient::new("tcp://127.0.0.1:8000");
/// if manage.ping().await? {
///     let hosts = manage.call_command("host", &["*"]).await?;
///     println!("{:?}", hosts.text);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ManageClient {
    endpoint: String,
    connector: Arc<dyn Connector>,
    service_key: ServiceKey,
    timeout: Duration,
}

impl ManageClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connector: Arc::new(TcpConnector::default()),
            service_key: ServiceKey::default(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_service_key(mut self, service_key: ServiceKey) -> Self {
        self.service_key = service_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one request and decodes the single reply.
    ///
    /// # Errors
    ///
    /// Connection, send and receive failures, and a reply that does not
    /// decode. A decoded reply with a failure status is not an error.
    pub async fn request(&self, message: WireMessage) -> Result<ZeroResult> {
        let frames = message.into_frames(&self.service_key)?;
        let exchange = async {
            let mut transport = self.connector.connect(&self.endpoint).await?;
            transport.send_frames(frames).await?;
            transport.recv_frames().await
        };
        let reply = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(reply) => reply?,
            Err(_) => return Err(ZeroError::Timeout(self.timeout.as_millis() as u64)),
        };

        let result = ZeroResult::unpack(&reply)?;
        debug!(endpoint = %self.endpoint, state = %result.state, "management reply");
        Ok(result)
    }

    /// Checks that the center answers.
    pub async fn ping(&self) -> Result<bool> {
        let reply = self.request(WireMessage::new(ByteCommand::Ping)).await?;
        Ok(reply.state == RemoteStatus::Ok)
    }

    /// Registers a station of this node with the center.
    pub async fn heart_join(&self, station: &str, real_name: &str) -> Result<bool> {
        self.heartbeat(ByteCommand::HeartJoin, station, real_name).await
    }

    /// Reports a station loop as ready.
    pub async fn heart_ready(&self, station: &str, real_name: &str) -> Result<bool> {
        self.heartbeat(ByteCommand::HeartReady, station, real_name).await
    }

    /// Deregisters a station of this node.
    pub async fn heart_left(&self, station: &str, real_name: &str) -> Result<bool> {
        self.heartbeat(ByteCommand::HeartLeft, station, real_name).await
    }

    async fn heartbeat(&self, verb: ByteCommand, station: &str, real_name: &str) -> Result<bool> {
        let message = WireMessage::new(verb)
            .frame(FrameType::Command, station.to_string())
            .frame(FrameType::Argument, real_name.to_string());
        let reply = self.request(message).await?;
        Ok(reply.state == RemoteStatus::Ok)
    }

    /// Runs a management command such as `host <station>` or `doc <station>
    /// <json>`.
    pub async fn call_command(&self, command: &str, args: &[&str]) -> Result<CommandResult> {
        let mut message =
            WireMessage::new(ByteCommand::General).frame(FrameType::Command, command.to_string());
        for arg in args {
            message.push(FrameType::Argument, arg.to_string());
        }

        let reply = self.request(message).await?;
        let text = reply
            .try_get_string(FrameType::Status)
            .or_else(|| reply.result.clone());
        Ok(CommandResult {
            state: reply.state,
            text,
        })
    }
}

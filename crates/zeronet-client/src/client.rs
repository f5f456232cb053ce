use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use zeronet_common::auth::ServiceKey;
use zeronet_common::protocol::{
    ApiResult, CallRequest, FrameType, RemoteStatus, ResultKind, ZeroPlan, ZeroResult,
};

use crate::pool::{ConnectionPool, PooledSocket};

/// Node name recorded when a reply does not say who answered.
pub const DEFAULT_RESPONDER: &str = "zero_center";

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a process-unique request id.
///
/// Upper 32 bits of the nanosecond clock combined with a monotonically
/// increasing counter, rendered as hex.
pub fn generate_request_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{:016x}", (timestamp & 0xFFFF_FFFF_0000_0000) | (counter & 0xFFFF_FFFF))
}

/// Whether the process may issue RPC calls right now.
pub trait Readiness: Send + Sync {
    fn can_operate(&self) -> bool;
}

impl<F> Readiness for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn can_operate(&self) -> bool {
        self()
    }
}

/// Readiness that is always satisfied, for tools running outside a station.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl Readiness for AlwaysReady {
    fn can_operate(&self) -> bool {
        true
    }
}

/// Timeouts of the two receive phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time allowed for the acknowledgement in milliseconds
    pub ack_timeout_ms: u64,
    /// Time allowed for the result after the acknowledgement in milliseconds
    pub result_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            result_timeout_ms: 30000,
        }
    }
}

/// Per-call identity frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub request_id: String,
    /// Route name of the caller's organization.
    pub responser: Option<String>,
    /// Global id of the local call chain.
    pub call_id: Option<String>,
    /// Serialized caller context.
    pub context: Option<String>,
}

impl CallContext {
    /// A context with a fresh request id.
    pub fn new() -> Self {
        Self {
            request_id: generate_request_id(),
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Receive-side protocol state of one call.
///
/// ```text
/// AwaitingAck --Running--> AwaitingResult --reply--> Done
///      |                        |
///      +--anything else--> Failed <--recv failure--+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    AwaitingAck,
    AwaitingResult,
    Done,
    Failed,
}

impl CallPhase {
    /// Applies one received (or failed) reply.
    pub fn advance(self, reply: &ZeroResult) -> CallPhase {
        match self {
            CallPhase::AwaitingAck
                if reply.interactive_success && reply.state == RemoteStatus::Running =>
            {
                CallPhase::AwaitingResult
            }
            CallPhase::AwaitingResult if reply.interactive_success => CallPhase::Done,
            CallPhase::AwaitingAck | CallPhase::AwaitingResult => CallPhase::Failed,
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallPhase::Done | CallPhase::Failed)
    }

    fn timeout(self, config: &ClientConfig) -> Duration {
        match self {
            CallPhase::AwaitingAck => Duration::from_millis(config.ack_timeout_ms),
            _ => Duration::from_millis(config.result_timeout_ms),
        }
    }
}

/// Result of one RPC call. Never an error: every failure is a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Final status: the remote one, or the local failure.
    pub state: RemoteStatus,
    /// Protocol phase the call ended in; `None` if nothing was sent.
    pub phase: Option<CallPhase>,
    pub result_kind: ResultKind,
    /// Result text: the remote result, or the serialized mapped result when
    /// the remote sent none.
    pub result: String,
    pub binary: Option<Bytes>,
    /// The status mapped onto the client-facing taxonomy.
    pub api_result: ApiResult,
}

impl CallOutcome {
    /// Builds the outcome from the final state and the last interaction.
    fn finish(state: RemoteStatus, phase: Option<CallPhase>, last: Option<ZeroResult>) -> Self {
        let mut api_result = state.client_result().to_api_result();
        if let Some(last) = last.as_ref().filter(|l| l.interactive_success) {
            let point = last
                .try_get_string(FrameType::Responser)
                .unwrap_or_else(|| DEFAULT_RESPONDER.to_string());
            api_result = api_result.with_point(point);
        }

        let (result_kind, remote_result, binary) = match last {
            Some(last) if phase == Some(CallPhase::Done) => (last.result_kind, last.result, last.binary),
            _ => (ResultKind::None, None, None),
        };
        let result = remote_result
            .filter(|r| !r.is_empty())
            .or_else(|| api_result.to_json().ok())
            .unwrap_or_default();

        Self {
            state,
            phase,
            result_kind,
            result,
            binary,
            api_result,
        }
    }

    /// Outcome of a call that never touched the wire.
    fn local(state: RemoteStatus) -> Self {
        Self::finish(state, None, None)
    }

    pub fn is_success(&self) -> bool {
        self.state == RemoteStatus::Ok
    }
}

/// RPC client for calling station APIs.
///
/// Every call borrows a socket from the [`ConnectionPool`], sends one
/// request, then receives twice: an acknowledgement that must be `Running`,
/// then the result. Any failure taints the borrowed socket.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use zeronet_client::{AlwaysReady, ApiClient, ConnectionPool, PoolConfig, StaticResolver};
///
/// # #[tokio::main]
/// # async fn main() {
/// let resolver = StaticResolver::new().with_station("UserCenter", "tcp://127.0.0.1:8101");
/// let pool = Arc::new(ConnectionPool::new(PoolConfig::default(), Arc::new(resolver)));
/// let client = ApiClient::new(pool, Arc::new(AlwaysReady), "Example");
///
/// let outcome = client.call("UserCenter", "v1/user/get", r#"{"id":1}"#).await;
/// println!("{} {}", outcome.state, outcome.result);
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    pool: Arc<ConnectionPool>,
    readiness: Arc<dyn Readiness>,
    service_key: ServiceKey,
    requester: String,
    config: ClientConfig,
}

impl ApiClient {
    /// Creates a client; `requester` is this station's name.
    pub fn new(
        pool: Arc<ConnectionPool>,
        readiness: Arc<dyn Readiness>,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            readiness,
            service_key: ServiceKey::default(),
            requester: requester.into(),
            config: ClientConfig::default(),
        }
    }

    pub fn with_service_key(mut self, service_key: ServiceKey) -> Self {
        self.service_key = service_key;
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Calls `command` on `station` with a JSON argument.
    pub async fn call(&self, station: &str, command: &str, argument: &str) -> CallOutcome {
        self.call_with(station, CallRequest::new(command, argument), CallContext::new())
            .await
    }

    /// Calls `command` with attached files.
    pub async fn call_with_files(
        &self,
        station: &str,
        command: &str,
        argument: &str,
        files: Vec<(String, Bytes)>,
    ) -> CallOutcome {
        let mut request = CallRequest::new(command, argument);
        request.files = files;
        self.call_with(station, request, CallContext::new()).await
    }

    /// Submits a plan instead of calling immediately.
    pub async fn plan(
        &self,
        station: &str,
        command: &str,
        argument: &str,
        plan: ZeroPlan,
    ) -> CallOutcome {
        let request = CallRequest::new(command, argument).with_plan(plan);
        self.call_with(station, request, CallContext::new()).await
    }

    /// Issues a fully specified request.
    ///
    /// Identity frames missing from `request` are filled from `context` and
    /// this client's requester name.
    pub async fn call_with(
        &self,
        station: &str,
        mut request: CallRequest,
        context: CallContext,
    ) -> CallOutcome {
        if !self.readiness.can_operate() {
            debug!(station, "call refused: not ready");
            return CallOutcome::local(RemoteStatus::LocalNoReady);
        }

        request.request_id.get_or_insert(context.request_id);
        request.requester.get_or_insert_with(|| self.requester.clone());
        if request.responser.is_none() {
            request.responser = context.responser;
        }
        if request.call_id.is_none() {
            request.call_id = context.call_id;
        }
        if request.context.is_none() {
            request.context = context.context;
        }

        let mut socket = match self
            .pool
            .get_socket(station, request.request_id.as_deref())
            .await
        {
            Some(socket) => socket,
            None => return CallOutcome::local(RemoteStatus::LocalNoReady),
        };

        let frames = match request
            .to_message()
            .and_then(|message| message.into_frames(&self.service_key))
        {
            Ok(frames) => frames,
            Err(e) => {
                warn!(station, error = %e, "failed to build request");
                return CallOutcome::local(RemoteStatus::LocalException);
            }
        };

        let (phase, last) = self.exchange(&mut socket, frames).await;
        let outcome = CallOutcome::finish(last.state, Some(phase), Some(last));
        trace!(station, command = %request.command, state = %outcome.state, "call finished");
        outcome
    }

    /// Sends the request and drives the receive phases to a terminal state.
    async fn exchange(&self, socket: &mut PooledSocket, frames: Vec<Bytes>) -> (CallPhase, ZeroResult) {
        if let Err(e) = socket.send(frames).await {
            warn!(station = socket.station(), error = %e, "send failed");
            socket.set_failed();
            return (CallPhase::Failed, ZeroResult::local(RemoteStatus::LocalSendError));
        }

        let mut phase = CallPhase::AwaitingAck;
        let mut last = ZeroResult::sent();
        while !phase.is_terminal() {
            let reply = self.receive(socket, phase.timeout(&self.config)).await;
            phase = phase.advance(&reply);
            last = reply;
        }

        if phase == CallPhase::Failed {
            socket.set_failed();
            // a decoded but unexpected acknowledgement ends the interaction too
            last.interactive_success = false;
        }
        (phase, last)
    }

    async fn receive(&self, socket: &mut PooledSocket, timeout: Duration) -> ZeroResult {
        match tokio::time::timeout(timeout, socket.recv()).await {
            Ok(Ok(frames)) => ZeroResult::from_frames(&frames),
            Ok(Err(e)) => {
                warn!(station = socket.station(), error = %e, "receive failed");
                ZeroResult::local(RemoteStatus::LocalRecvError)
            }
            Err(_) => {
                warn!(station = socket.station(), timeout_ms = timeout.as_millis() as u64, "receive timed out");
                ZeroResult::local(RemoteStatus::LocalRecvError)
            }
        }
    }
}

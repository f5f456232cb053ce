//! API Client Integration Tests
//!
//! These tests run the RPC client against an in-process fake station over
//! loopback TCP and verify:
//! - The two-phase receive (acknowledgement, then result)
//! - Status mapping of remote failures
//! - Socket reuse after success and discard after protocol failure
//! - The readiness gate and the "no socket" short-circuit

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use zeronet_client::{
    AlwaysReady, ApiClient, CallContext, CallPhase, ClientConfig, ConnectionPool, PoolConfig,
    StaticResolver,
};
use zeronet_common::protocol::{
    CallRequest, ClientResultKind, FrameType, PlanType, ReceivedRequest,
    RemoteStatus, ReplyMessage, ResultKind, ZeroPlan,
};
use zeronet_common::transport::{FrameListener, FrameTransport, TcpFrameTransport};

/// Fake worker station. Behavior is chosen by the `Command` frame.
struct FakeStation {
    endpoint: String,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl FakeStation {
    async fn start() -> Self {
        let listener = FrameListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.endpoint().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (conn_count, seen) = (connections.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok(transport) = listener.accept().await {
                conn_count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(Self::serve(transport, seen.clone()));
            }
        });

        Self {
            endpoint,
            connections,
            requests,
        }
    }

    async fn serve(mut transport: TcpFrameTransport, seen: Arc<Mutex<Vec<ReceivedRequest>>>) {
        while let Ok(frames) = transport.recv_frames().await {
            let request = ReceivedRequest::unpack(&frames).unwrap();
            seen.lock().unwrap().push(request.clone());

            let command = request.get_string(FrameType::Command).unwrap_or_default();
            let argument = request.get_string(FrameType::Argument).unwrap_or_default();
            let replies = match command.as_str() {
                "echo" => vec![
                    ReplyMessage::ack().into_frames(),
                    ReplyMessage::new(RemoteStatus::Ok)
                        .frame(FrameType::ResultText, argument)
                        .frame(FrameType::Responser, "worker-1")
                        .into_frames(),
                ],
                "binary" => vec![
                    ReplyMessage::ack().into_frames(),
                    ReplyMessage::new(RemoteStatus::Ok)
                        .frame(FrameType::BinaryContent, Bytes::from_static(&[9, 8, 7]))
                        .into_frames(),
                ],
                "count_files" => {
                    let files = request.all(FrameType::ExtendText).count();
                    vec![
                        ReplyMessage::ack().into_frames(),
                        ReplyMessage::new(RemoteStatus::Ok)
                            .frame(FrameType::ResultText, files.to_string())
                            .into_frames(),
                    ]
                }
                "reject" => vec![ReplyMessage::new(RemoteStatus::DenyAccess).into_frames()],
                "remote_error" => vec![
                    ReplyMessage::ack().into_frames(),
                    ReplyMessage::new(RemoteStatus::ArgumentInvalid).into_frames(),
                ],
                "garbage" => {
                    // one declared frame, two sent
                    let mut broken = ReplyMessage::new(RemoteStatus::Ok)
                        .frame(FrameType::ResultText, "x")
                        .into_frames();
                    broken.push(Bytes::from_static(b"extra"));
                    vec![ReplyMessage::ack().into_frames(), broken]
                }
                "silent" => continue,
                _ => return,
            };
            for reply in replies {
                if transport.send_frames(reply).await.is_err() {
                    return;
                }
            }
        }
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> ReceivedRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

fn client_for(station: &FakeStation) -> ApiClient {
    let resolver = StaticResolver::new().with_station("Worker", station.endpoint.clone());
    let pool = Arc::new(ConnectionPool::new(PoolConfig::default(), Arc::new(resolver)));
    ApiClient::new(pool, Arc::new(AlwaysReady), "TestCaller").with_config(ClientConfig {
        ack_timeout_ms: 300,
        result_timeout_ms: 300,
    })
}

#[tokio::test]
async fn test_successful_call_returns_remote_result() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let outcome = client.call("Worker", "echo", r#"{"n":1}"#).await;

    assert_eq!(outcome.state, RemoteStatus::Ok);
    assert_eq!(outcome.phase, Some(CallPhase::Done));
    assert_eq!(outcome.result_kind, ResultKind::Text);
    assert_eq!(outcome.result, r#"{"n":1}"#);
    assert!(outcome.api_result.success);
    assert_eq!(outcome.api_result.status.point.as_deref(), Some("worker-1"));

    let request = station.last_request();
    assert_eq!(request.get_string(FrameType::Requester).as_deref(), Some("TestCaller"));
    assert!(!request.get_string(FrameType::RequestId).unwrap().is_empty());
}

#[tokio::test]
async fn test_socket_is_reused_after_success() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    for _ in 0..3 {
        assert!(client.call("Worker", "echo", "{}").await.is_success());
    }
    assert_eq!(station.connections(), 1);
    assert_eq!(client.pool().idle_count("Worker"), 1);
}

#[tokio::test]
async fn test_non_running_ack_is_final_and_taints_socket() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let outcome = client.call("Worker", "reject", "{}").await;
    assert_eq!(outcome.state, RemoteStatus::DenyAccess);
    assert_eq!(outcome.phase, Some(CallPhase::Failed));
    assert_eq!(
        outcome.api_result.status.code,
        ClientResultKind::DenyAccess.code()
    );
    // the interaction is not counted as successful, so no responder
    assert!(outcome.api_result.status.point.is_none());
    assert_eq!(client.pool().idle_count("Worker"), 0);

    // next call opens a fresh socket
    assert!(client.call("Worker", "echo", "{}").await.is_success());
    assert_eq!(station.connections(), 2);
}

#[tokio::test]
async fn test_remote_failure_in_result_is_mapped() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let outcome = client.call("Worker", "remote_error", "{}").await;
    assert_eq!(outcome.state, RemoteStatus::ArgumentInvalid);
    assert_eq!(outcome.phase, Some(CallPhase::Done));
    assert_eq!(outcome.api_result.status.point.as_deref(), Some("zero_center"));

    let value: serde_json::Value = serde_json::from_str(&outcome.result).unwrap();
    assert_eq!(value["success"], false);
    assert_eq!(value["status"]["msg"], "Invalid argument");
    // protocol completed normally, socket goes back
    assert_eq!(client.pool().idle_count("Worker"), 1);
}

#[tokio::test]
async fn test_malformed_result_is_network_error() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let outcome = client.call("Worker", "garbage", "{}").await;
    assert_eq!(outcome.state, RemoteStatus::FrameInvalid);
    assert_eq!(outcome.state.client_result(), ClientResultKind::NetworkError);
    assert_eq!(client.pool().idle_count("Worker"), 0);
}

#[tokio::test]
async fn test_hang_up_is_recv_error() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let outcome = client.call("Worker", "hang_up", "{}").await;
    assert_eq!(outcome.state, RemoteStatus::LocalRecvError);
    assert_eq!(outcome.phase, Some(CallPhase::Failed));
    assert_eq!(client.pool().idle_count("Worker"), 0);
}

#[tokio::test]
async fn test_missing_ack_times_out() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let started = tokio::time::Instant::now();
    let outcome = client.call("Worker", "silent", "{}").await;
    assert_eq!(outcome.state, RemoteStatus::LocalRecvError);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(client.pool().idle_count("Worker"), 0);
}

#[tokio::test]
async fn test_binary_result() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let outcome = client.call("Worker", "binary", "{}").await;
    assert_eq!(outcome.result_kind, ResultKind::Binary);
    assert_eq!(outcome.binary, Some(Bytes::from_static(&[9, 8, 7])));
    // no text from the remote, so the mapped result is filled in
    let value: serde_json::Value = serde_json::from_str(&outcome.result).unwrap();
    assert_eq!(value["success"], true);
}

#[tokio::test]
async fn test_call_with_files() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let files = vec![
        ("a.txt".to_string(), Bytes::from_static(b"aaa")),
        ("b.bin".to_string(), Bytes::from_static(&[0, 1])),
    ];
    let outcome = client.call_with_files("Worker", "count_files", "{}", files).await;
    assert_eq!(outcome.result, "2");

    let request = station.last_request();
    let names: Vec<_> = request.all(FrameType::ExtendText).cloned().collect();
    assert_eq!(names, vec![Bytes::from_static(b"a.txt"), Bytes::from_static(b"b.bin")]);
}

#[tokio::test]
async fn test_plan_submission() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let plan = ZeroPlan::repeat(PlanType::Minute, 5, 3);
    let outcome = client.plan("Worker", "echo", "{}", plan.clone()).await;
    assert!(outcome.is_success());

    let request = station.last_request();
    let sent: ZeroPlan =
        serde_json::from_str(&request.get_string(FrameType::Plan).unwrap()).unwrap();
    assert_eq!(sent, plan);
}

#[tokio::test]
async fn test_explicit_context_frames() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let context = CallContext::new()
        .with_request_id("fixed-id")
        .with_context(r#"{"user":1}"#);
    let outcome = client
        .call_with("Worker", CallRequest::new("echo", "{}"), context)
        .await;
    assert!(outcome.is_success());

    let request = station.last_request();
    assert_eq!(request.get_string(FrameType::RequestId).as_deref(), Some("fixed-id"));
    assert_eq!(request.get_string(FrameType::Context).as_deref(), Some(r#"{"user":1}"#));
}

#[tokio::test]
async fn test_not_ready_short_circuits() {
    let station = FakeStation::start().await;
    let ready = Arc::new(AtomicBool::new(false));

    let resolver = StaticResolver::new().with_station("Worker", station.endpoint.clone());
    let pool = Arc::new(ConnectionPool::new(PoolConfig::default(), Arc::new(resolver)));
    let gate = ready.clone();
    let client = ApiClient::new(pool, Arc::new(move || gate.load(Ordering::SeqCst)), "TestCaller");

    let outcome = client.call("Worker", "echo", "{}").await;
    assert_eq!(outcome.state, RemoteStatus::LocalNoReady);
    assert_eq!(outcome.phase, None);
    assert_eq!(station.connections(), 0);

    ready.store(true, Ordering::SeqCst);
    assert!(client.call("Worker", "echo", "{}").await.is_success());
}

#[tokio::test]
async fn test_unknown_station_is_no_ready() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let outcome = client.call("Nobody", "echo", "{}").await;
    assert_eq!(outcome.state, RemoteStatus::LocalNoReady);
    assert_eq!(outcome.state.client_result(), ClientResultKind::NoReady);
}

#[tokio::test]
async fn test_concurrent_calls_use_separate_sockets() {
    let station = FakeStation::start().await;
    let client = client_for(&station);

    let calls = (0..8).map(|i| {
        let client = client.clone();
        async move { client.call("Worker", "echo", &i.to_string()).await }
    });
    let outcomes = futures::future::join_all(calls).await;

    for (i, outcome) in outcomes.iter().enumerate() {
        assert!(outcome.is_success());
        assert_eq!(outcome.result, i.to_string());
    }
    assert!(station.connections() >= 1);
    assert!(station.connections() <= 8);
}

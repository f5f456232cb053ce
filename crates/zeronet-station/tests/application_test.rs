//! Application Lifecycle Tests
//!
//! These tests run a [`ZeroApplication`] against a scripted center and an
//! in-memory broadcast channel and verify:
//! - The join sequence and its short-circuit on the first failure
//! - Work model differences (service, client, bridge)
//! - Station registration, start and replacement
//! - Monitor variant switching and recovery after the center returns
//! - Shutdown ordering and idempotence

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{eventually, FakeBus, FakeCenter};
use zeronet_common::{PublishItem, StationKind, ZeroNetEventType};
use zeronet_station::monitor::{MachineKind, MonitorActions};
use zeronet_station::station::{StationContext, ZeroStation};
use zeronet_station::{
    ApplicationState, CenterState, GlobalRef, Result, WorkModel, ZeroAppConfig, ZeroApplication,
    ZeroNetEvent,
};

/// Station that records lifecycle calls and holds its global reference
/// while started.
struct TestStation {
    name: String,
    running: AtomicBool,
    starts: AtomicUsize,
    closes: AtomicUsize,
    destroys: AtomicUsize,
    global: std::sync::Mutex<Option<GlobalRef>>,
}

impl TestStation {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            running: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            global: std::sync::Mutex::new(None),
        })
    }
}

#[async_trait]
impl ZeroStation for TestStation {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StationKind {
        StationKind::Notify
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn start(&self, context: StationContext) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        *self.global.lock().unwrap() = Some(context.global);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.global.lock().unwrap().take();
    }

    async fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.close().await;
    }
}

const MONITOR: &str = "tcp://127.0.0.1:8001";

fn config(work_model: WorkModel) -> ZeroAppConfig {
    let mut config = ZeroAppConfig {
        station_name: "Orders".to_string(),
        work_model,
        ..Default::default()
    };
    config.monitor.poll_timeout_ms = 20;
    config
}

fn app(center: &Arc<FakeCenter>, bus: &FakeBus, work_model: WorkModel) -> ZeroApplication {
    ZeroApplication::with_parts(config(work_model), center.clone(), bus.factory())
}

fn push(bus: &FakeBus, event: ZeroNetEventType, station: &str) {
    let item = PublishItem::new("zero_center", event).with_sub_title(station);
    bus.send(MONITOR, item.into_frames());
}

#[tokio::test]
async fn test_service_join_sequence() {
    let center = FakeCenter::new().with_station("Orders");
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    let station = TestStation::new("Orders");
    app.register_station(station.clone()).await;
    let mut events = app.events();

    assert_eq!(app.state().application(), ApplicationState::Initialized);
    assert!(app.start().await);

    assert_eq!(app.state().application(), ApplicationState::Run);
    assert_eq!(app.state().center(), CenterState::Run);
    assert!(app.state().can_operate());
    assert_eq!(
        center.calls(),
        vec!["ping", "heart_join", "load_all_config", "upload_document"]
    );
    assert_eq!(app.configs().len(), 1);
    assert_eq!(app.monitor_kind(), MachineKind::Running);

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, ZeroNetEvent::StationsStarted);
    assert_eq!(station.starts.load(Ordering::SeqCst), 1);

    app.shutdown().await;
}

#[tokio::test]
async fn test_ping_failure_short_circuits() {
    let center = FakeCenter::new();
    center.ping_ok.store(false, Ordering::SeqCst);
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);

    assert!(!app.start().await);
    assert_eq!(app.state().application(), ApplicationState::Failed);
    assert_eq!(app.state().center(), CenterState::Failed);
    assert_eq!(center.calls(), vec!["ping"]);
    assert_eq!(app.monitor_kind(), MachineKind::Failed);

    app.shutdown().await;
    // a failed service node deregisters on the way out
    assert_eq!(center.count("heart_left"), 1);
}

#[tokio::test]
async fn test_join_failure_skips_config_load() {
    let center = FakeCenter::new();
    center.join_ok.store(false, Ordering::SeqCst);
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);

    assert!(!app.join_center().await);
    assert_eq!(center.calls(), vec!["ping", "heart_join"]);
    assert_eq!(app.state().application(), ApplicationState::Failed);
    assert_eq!(app.state().center(), CenterState::Failed);
}

#[tokio::test]
async fn test_config_failure_stops_join() {
    let center = FakeCenter::new();
    center.load_ok.store(false, Ordering::SeqCst);
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);

    assert!(!app.join_center().await);
    assert_eq!(center.calls(), vec!["ping", "heart_join", "load_all_config"]);
    assert_eq!(app.state().application(), ApplicationState::Failed);
}

#[tokio::test]
async fn test_join_when_running_does_nothing() {
    let center = FakeCenter::new();
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Client);

    assert!(app.start().await);
    let calls = center.calls().len();

    assert!(!app.join_center().await);
    assert!(!app.start().await);
    assert_eq!(center.calls().len(), calls);
    assert_eq!(app.state().application(), ApplicationState::Run);
}

#[tokio::test]
async fn test_client_mode_does_not_register() {
    let center = FakeCenter::new().with_station("Orders");
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Client);
    let station = TestStation::new("Orders");
    app.register_station(station.clone()).await;

    assert!(app.start().await);
    assert_eq!(center.calls(), vec!["ping", "load_all_config"]);
    assert_eq!(app.monitor_kind(), MachineKind::Running);

    // stations are only hosted in service mode
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(station.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bridge_mode_only_pings() {
    let center = FakeCenter::new();
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Bridge);

    assert!(app.start().await);
    assert_eq!(center.calls(), vec!["ping"]);
    assert_eq!(app.state().application(), ApplicationState::Run);
    assert!(app.state().can_operate());

    app.shutdown().await;
    assert_eq!(app.state().application(), ApplicationState::Disposed);
}

#[tokio::test]
async fn test_register_replaces_and_starts_when_running() {
    let center = FakeCenter::new().with_station("Orders");
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    let first = TestStation::new("Orders");
    app.register_station(first.clone()).await;

    assert!(app.start().await);
    assert!(eventually(|| first.is_running()).await);

    let second = TestStation::new("orders");
    app.register_station(second.clone()).await;
    assert!(!first.is_running());
    assert_eq!(first.closes.load(Ordering::SeqCst), 1);
    assert!(second.is_running());
    assert!(Arc::ptr_eq(
        &app.station("ORDERS").unwrap(),
        &(second.clone() as Arc<dyn ZeroStation>)
    ));

    // unknown to the center: registered but not started
    let orphan = TestStation::new("Unknown");
    app.register_station(orphan.clone()).await;
    assert!(!orphan.is_running());

    app.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let center = FakeCenter::new().with_station("Orders");
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    let station = TestStation::new("Orders");
    app.register_station(station.clone()).await;
    assert!(app.start().await);
    assert!(eventually(|| station.is_running()).await);

    let waiter = tokio::spawn({
        let app = app.clone();
        async move { app.wait_for_shutdown().await }
    });

    app.shutdown().await;
    app.shutdown().await;

    assert_eq!(app.state().application(), ApplicationState::Disposed);
    assert_eq!(station.destroys.load(Ordering::SeqCst), 1);
    assert!(app.pool().is_closed());
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_global_refs() {
    let center = FakeCenter::new();
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Client);
    assert!(app.start().await);

    let held = app.global_ref();
    let shutdown = tokio::spawn({
        let app = app.clone();
        async move { app.shutdown().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.state().application(), ApplicationState::Destroy);
    assert!(!shutdown.is_finished());

    drop(held);
    tokio::time::timeout(Duration::from_secs(1), shutdown)
        .await
        .unwrap()
        .unwrap();
    assert!(app.state().disposed());
}

#[tokio::test]
async fn test_join_after_shutdown_is_refused() {
    let center = FakeCenter::new();
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Client);
    assert!(app.start().await);
    app.shutdown().await;
    let calls = center.calls();

    assert!(!app.join_center().await);
    assert!(!app.start().await);
    assert_eq!(app.state().application(), ApplicationState::Disposed);
    assert_eq!(center.calls(), calls);
}

#[tokio::test]
async fn test_rejoin_overtaken_by_shutdown() {
    let center = FakeCenter::new();
    center.ping_ok.store(false, Ordering::SeqCst);
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    assert!(!app.start().await);
    assert_eq!(app.state().application(), ApplicationState::Failed);

    center.ping_ok.store(true, Ordering::SeqCst);
    center.ping_delay_ms.store(200, Ordering::SeqCst);
    let rejoin = tokio::spawn({
        let app = app.clone();
        async move { app.join_center().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    // a second join while the first is in flight is refused
    assert!(!app.join_center().await);

    app.shutdown().await;
    assert!(!rejoin.await.unwrap());

    assert_eq!(app.state().application(), ApplicationState::Disposed);
    // the node never registers again after teardown
    assert_eq!(center.calls(), vec!["ping", "ping"]);
}

#[tokio::test]
async fn test_center_down_after_shutdown_keeps_terminal_state() {
    let center = FakeCenter::new();
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    assert!(app.start().await);
    app.shutdown().await;

    app.center_down(CenterState::Failed).await;
    assert_eq!(app.state().application(), ApplicationState::Disposed);
    assert!(!app.state().alive());
}

#[tokio::test]
async fn test_center_stop_fails_then_recovers() {
    let center = FakeCenter::new().with_station("Orders");
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    let station = TestStation::new("Orders");
    app.register_station(station.clone()).await;
    assert!(app.start().await);
    assert!(eventually(|| station.is_running()).await);
    let swaps = app.monitor_machine().swap_count();

    push(&bus, ZeroNetEventType::CenterSystemStop, "");
    assert!(eventually(|| app.state().application() == ApplicationState::Failed).await);
    assert_eq!(app.state().center(), CenterState::Stop);
    assert!(!station.is_running());
    assert!(!app.state().can_operate());
    assert_eq!(app.monitor_machine().swap_count(), swaps + 1);

    // the center is alive again
    push(&bus, ZeroNetEventType::CenterWorkerSoundOff, "");
    assert!(eventually(|| app.state().application() == ApplicationState::Run).await);
    assert!(eventually(|| station.is_running()).await);
    assert_eq!(center.count("ping"), 2);

    app.shutdown().await;
}

#[tokio::test]
async fn test_running_forwards_center_events() {
    let center = FakeCenter::new().with_station("Orders");
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    let station = TestStation::new("Orders");
    app.register_station(station.clone()).await;
    assert!(app.start().await);
    assert!(eventually(|| station.is_running()).await);

    let mut events = app.events();
    push(&bus, ZeroNetEventType::CenterStationPause, "Orders");
    assert!(eventually(|| !station.is_running()).await);

    push(&bus, ZeroNetEventType::CenterStationResume, "Orders");
    assert!(eventually(|| station.is_running()).await);
    // the resumed station's config was fetched again
    assert_eq!(center.count("host"), 1);

    let mut forwarded = Vec::new();
    while forwarded.len() < 2 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        if let ZeroNetEvent::Center(item) = event {
            forwarded.push(item.event);
        }
    }
    assert_eq!(
        forwarded,
        vec![
            ZeroNetEventType::CenterStationPause,
            ZeroNetEventType::CenterStationResume
        ]
    );

    app.shutdown().await;
}

#[tokio::test]
async fn test_service_document_lists_stations() {
    let center = FakeCenter::new();
    let bus = FakeBus::default();
    let app = app(&center, &bus, WorkModel::Service);
    app.register_station(TestStation::new("Beta")).await;
    app.register_station(TestStation::new("Alpha")).await;

    let document = app.service_document();
    assert_eq!(document["station_name"], "Orders");
    assert_eq!(document["stations"][0]["name"], "Alpha");
    assert_eq!(document["stations"][1]["kind"], "notify");
}

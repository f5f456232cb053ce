//! Process lifecycle: joining the center, hosting stations, shutting down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use zeronet_client::{ApiClient, ConnectionPool};
use zeronet_common::auth::ServiceKey;
use zeronet_common::PublishItem;

use crate::center::{CenterClient, ZeroCenterClient};
use crate::config::ZeroAppConfig;
use crate::error::{Result, StationError};
use crate::global::{GlobalRef, GlobalRefs};
use crate::monitor::{EventMonitor, MachineKind, MachineSlot, MonitorActions};
use crate::registry::ConfigRegistry;
use crate::state::{ApplicationState, CenterState, StateHolder, WorkModel};
use crate::station::{tcp_subscribers, StationContext, SubscriberFactory, ZeroStation};

/// Upper bound on waiting for global references at shutdown.
const GLOBAL_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the application event channel.
const EVENT_CAPACITY: usize = 256;

/// Notification published on the application event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ZeroNetEvent {
    /// Local stations were started after joining the center.
    StationsStarted,
    /// Local stations were closed (center lost or shutdown).
    StationsEnded,
    /// A center broadcast received while running.
    Center(PublishItem),
}

struct AppInner {
    config: ZeroAppConfig,
    state: StateHolder,
    center: Arc<dyn CenterClient>,
    configs: Arc<ConfigRegistry>,
    pool: Arc<ConnectionPool>,
    stations: Mutex<HashMap<String, Arc<dyn ZeroStation>>>,
    global: GlobalRefs,
    events: broadcast::Sender<ZeroNetEvent>,
    machine: Arc<MachineSlot>,
    subscribers: SubscriberFactory,
    monitor: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
    exited: watch::Sender<bool>,
}

/// A station process.
///
/// # Lifecycle
///
/// ```text
/// Initialized -> Start -> BeginRun -> Run -> Destroy -> Disposed
///                             |        |
///                             +-> Failed <-+  (center lost; rejoin returns to Run)
/// ```
///
/// [`start`](Self::start) joins the center: ping, register (service mode),
/// load every station config, upload the service document, then start the
/// registered stations. In service mode it also starts the event monitor,
/// which fails the application when the center goes silent and rejoins when
/// it comes back.
///
/// # Example
///
/// ```rust,no_run
/// use zeronet_station::{ZeroAppConfig, ZeroApplication};
///
/// # #[tokio::main]
/// # async fn main() -> zeronet_station::Result<()> {
/// let app = ZeroApplication::new(ZeroAppConfig::load("host.json")?);
/// if app.start().await {
///     let client = app.api_client();
///     let outcome = client.call("UserCenter", "v1/user/get", r#"{"id":1}"#).await;
///     println!("{}", outcome.result);
/// }
/// app.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ZeroApplication {
    inner: Arc<AppInner>,
}

impl ZeroApplication {
    /// Creates an application talking to the center named in `config`.
    pub fn new(config: ZeroAppConfig) -> Self {
        let center = Arc::new(ZeroCenterClient::new(
            config.manage_address(),
            ServiceKey::new(config.service_key.clone()),
        ));
        let subscribers = tcp_subscribers(Duration::from_millis(config.pool.connect_timeout_ms));
        Self::with_parts(config, center, subscribers)
    }

    /// Creates an application over an explicit center client and subscriber
    /// factory.
    pub fn with_parts(
        config: ZeroAppConfig,
        center: Arc<dyn CenterClient>,
        subscribers: SubscriberFactory,
    ) -> Self {
        let state = StateHolder::new(config.work_model);
        let machine = Arc::new(MachineSlot::new());
        state.add_observer(machine.clone());

        let configs = Arc::new(ConfigRegistry::new(center.clone()));
        let pool = Arc::new(ConnectionPool::new(config.pool.clone(), configs.clone()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (exited, _) = watch::channel(false);

        let app = Self {
            inner: Arc::new(AppInner {
                config,
                state,
                center,
                configs,
                pool,
                stations: Mutex::new(HashMap::new()),
                global: GlobalRefs::new(),
                events,
                machine,
                subscribers,
                monitor: Mutex::new(None),
                shutting_down: AtomicBool::new(false),
                exited,
            }),
        };
        app.inner.state.set_application(ApplicationState::Initialized);
        app
    }

    pub fn config(&self) -> &ZeroAppConfig {
        &self.inner.config
    }

    pub fn state(&self) -> &StateHolder {
        &self.inner.state
    }

    pub fn center(&self) -> &Arc<dyn CenterClient> {
        &self.inner.center
    }

    pub fn configs(&self) -> &Arc<ConfigRegistry> {
        &self.inner.configs
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.inner.pool
    }

    /// Kind of the installed monitor state machine.
    pub fn monitor_kind(&self) -> MachineKind {
        self.inner.machine.kind()
    }

    pub fn monitor_machine(&self) -> &Arc<MachineSlot> {
        &self.inner.machine
    }

    /// Subscribes to application events.
    pub fn events(&self) -> broadcast::Receiver<ZeroNetEvent> {
        self.inner.events.subscribe()
    }

    /// Takes a global reference; shutdown waits until all are dropped.
    pub fn global_ref(&self) -> GlobalRef {
        self.inner.global.acquire()
    }

    /// RPC client gated on this application's readiness.
    pub fn api_client(&self) -> ApiClient {
        let config = &self.inner.config;
        ApiClient::new(
            self.inner.pool.clone(),
            Arc::new(self.inner.state.clone()),
            config.station_name.clone(),
        )
        .with_service_key(ServiceKey::new(config.service_key.clone()))
        .with_config(config.client.clone())
    }

    fn emit(&self, event: ZeroNetEvent) {
        // no receivers is fine
        let _ = self.inner.events.send(event);
    }

    // ----- stations -----

    pub fn station(&self, name: &str) -> Option<Arc<dyn ZeroStation>> {
        self.inner
            .stations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&name.to_lowercase())
            .cloned()
    }

    fn stations(&self) -> Vec<Arc<dyn ZeroStation>> {
        self.inner
            .stations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Registers a local station.
    ///
    /// A station with the same name is closed and replaced. When the
    /// application is already running the new station is started right away,
    /// provided the center knows its configuration.
    pub async fn register_station(&self, station: Arc<dyn ZeroStation>) {
        let previous = self
            .inner
            .stations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(station.name().to_lowercase(), station.clone());
        if let Some(previous) = previous {
            info!(station = previous.name(), "replacing station");
            previous.close().await;
        }

        if self.inner.state.in_run() {
            if let Err(e) = self.start_station(station.clone()).await {
                warn!(station = station.name(), error = %e, "station not started");
            }
        }
    }

    fn station_context(&self, config: zeronet_common::StationConfig) -> StationContext {
        StationContext {
            config,
            real_name: self.inner.config.real_name.clone(),
            center: self.inner.center.clone(),
            state: self.inner.state.clone(),
            subscribers: self.inner.subscribers.clone(),
            poll_timeout: self.inner.config.monitor.poll_timeout(),
            global: self.inner.global.acquire(),
        }
    }

    async fn start_station(&self, station: Arc<dyn ZeroStation>) -> Result<()> {
        if station.is_running() {
            return Ok(());
        }
        let config = self
            .inner
            .configs
            .get(station.name())
            .await
            .ok_or_else(|| StationError::NotConfigured(station.name().to_string()))?;
        station.start(self.station_context(config)).await
    }

    /// Starts every registered station.
    async fn start_stations(&self) {
        let mut tasks = JoinSet::new();
        for station in self.stations() {
            let app = self.clone();
            tasks.spawn(async move {
                let name = station.name().to_string();
                (name, app.start_station(station).await)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(station = %name, "station started"),
                Ok((name, Err(e))) => warn!(station = %name, error = %e, "station failed to start"),
                Err(e) => error!(error = %e, "station start task panicked"),
            }
        }
        self.emit(ZeroNetEvent::StationsStarted);
    }

    /// Closes every registered station.
    async fn end_stations(&self) {
        let mut tasks = JoinSet::new();
        for station in self.stations() {
            tasks.spawn(async move { station.close().await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "station close task panicked");
            }
        }
        self.emit(ZeroNetEvent::StationsEnded);
    }

    async fn destroy_stations(&self) {
        let mut tasks = JoinSet::new();
        for station in self.stations() {
            tasks.spawn(async move { station.destroy().await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "station destroy task panicked");
            }
        }
    }

    /// Self-description uploaded to the center when joining.
    pub fn service_document(&self) -> serde_json::Value {
        let config = &self.inner.config;
        let mut stations: Vec<_> = self
            .stations()
            .iter()
            .map(|station| json!({ "name": station.name(), "kind": station.kind() }))
            .collect();
        stations.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        json!({
            "service_name": config.service_name,
            "station_name": config.station_name,
            "real_name": config.real_name,
            "stations": stations,
        })
    }

    // ----- lifecycle -----

    /// Starts the application: joins the center and, in service mode,
    /// starts the event monitor.
    ///
    /// Does nothing and returns `false` when already running, joining or
    /// shutting down.
    pub async fn start(&self) -> bool {
        let state = &self.inner.state;
        let started = state.update_application(|current| match current {
            ApplicationState::BeginRun
            | ApplicationState::Run
            | ApplicationState::Closing
            | ApplicationState::Destroy
            | ApplicationState::Disposed => None,
            _ => Some(ApplicationState::Start),
        });
        if let Err(current) = started {
            debug!(state = ?current, "start ignored");
            return false;
        }

        state.set_center(CenterState::None);
        let joined = self.join_center().await;
        if state.work_model() == WorkModel::Service {
            self.spawn_monitor();
        }
        joined
    }

    /// Joins the center.
    ///
    /// Steps run strictly in order and stop at the first failure, which
    /// leaves both the application and the center `Failed`:
    ///
    /// 1. ping
    /// 2. register this node (service mode)
    /// 3. load every station config
    /// 4. upload the service document and start local stations (service mode)
    ///
    /// Bridge mode stops after the ping. Returns `false` without doing
    /// anything when the application already runs, another join is in
    /// flight, or shutdown has begun. A join overtaken by shutdown stops at
    /// the next step and leaves the terminal state alone.
    pub async fn join_center(&self) -> bool {
        let state = &self.inner.state;
        let joining = state.update_application(|current| match current {
            ApplicationState::BeginRun
            | ApplicationState::Run
            | ApplicationState::Destroy
            | ApplicationState::Disposed => None,
            _ => Some(ApplicationState::BeginRun),
        });
        if let Err(current) = joining {
            debug!(state = ?current, "join skipped");
            return false;
        }
        state.set_center(CenterState::Start);

        let config = &self.inner.config;
        let center = &self.inner.center;
        info!(endpoint = %config.manage_address(), "connecting to zero center");

        if !Self::succeeded("ping", center.ping().await) {
            state.set_failed();
            error!("zero center can't be reached");
            return false;
        }
        if self.overtaken() {
            return false;
        }
        state.set_center(CenterState::Run);

        let work_model = state.work_model();
        if work_model == WorkModel::Bridge {
            return state.advance(ApplicationState::Run);
        }

        if work_model == WorkModel::Service
            && !Self::succeeded(
                "heart join",
                center.heart_join(&config.station_name, &config.real_name).await,
            )
        {
            state.set_failed();
            error!("zero center refused to join");
            return false;
        }
        if self.overtaken() {
            return false;
        }

        match center.load_all_config().await {
            Ok(configs) => self.inner.configs.replace_all(configs),
            Err(e) => {
                state.set_failed();
                error!(error = %e, "station configs can't be loaded");
                return false;
            }
        }
        info!(stations = self.inner.configs.len(), "joined zero center");
        if self.overtaken() {
            return false;
        }

        if work_model == WorkModel::Service {
            let document = self.service_document().to_string();
            if !Self::succeeded(
                "upload document",
                center.upload_document(&config.station_name, &document).await,
            ) {
                warn!("service document not accepted");
            }
        }

        if !state.advance(ApplicationState::Run) {
            debug!("shutdown began before the join finished");
            return false;
        }
        if work_model == WorkModel::Service {
            let app = self.clone();
            tokio::spawn(async move { app.start_stations().await });
        }
        true
    }

    /// Shutdown began while a join was in flight.
    fn overtaken(&self) -> bool {
        let torn_down = !self.inner.state.alive();
        if torn_down {
            debug!("join abandoned, application is shutting down");
        }
        torn_down
    }

    fn succeeded(step: &str, result: Result<bool>) -> bool {
        match result {
            Ok(ok) => ok,
            Err(e) => {
                warn!(step, error = %e, "center request failed");
                false
            }
        }
    }

    fn spawn_monitor(&self) {
        let mut monitor = self.inner.monitor.lock().unwrap_or_else(|e| e.into_inner());
        if monitor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let actions: Arc<dyn MonitorActions> = Arc::new(self.clone());
        let task = EventMonitor::new(
            self.inner.config.monitor_address(),
            self.inner.state.clone(),
            self.inner.machine.clone(),
            actions,
            self.inner.subscribers.clone(),
            self.inner.config.monitor.clone(),
        )
        .spawn();
        *monitor = Some(task);
    }

    /// Shuts the application down. Only the first call does anything.
    ///
    /// Closes the stations (or deregisters a failed node), marks the
    /// application `Destroy`, waits for global references, destroys the
    /// stations, closes the connection pool, waits for the monitor, marks
    /// the application `Disposed` and releases [`wait_for_shutdown`].
    ///
    /// [`wait_for_shutdown`]: Self::wait_for_shutdown
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            debug!("shutdown already done");
            return;
        }
        info!("begin shutdown");

        let state = &self.inner.state;
        let config = &self.inner.config;
        match state.application() {
            ApplicationState::Destroy | ApplicationState::Disposed => return,
            ApplicationState::BeginRun | ApplicationState::Run => self.end_stations().await,
            ApplicationState::Failed if state.work_model() == WorkModel::Service => {
                let left = self
                    .inner
                    .center
                    .heart_left(&config.station_name, &config.real_name)
                    .await;
                Self::succeeded("heart left", left);
            }
            _ => {}
        }
        state.set_application(ApplicationState::Destroy);

        if state.work_model() != WorkModel::Bridge {
            let drained =
                tokio::time::timeout(GLOBAL_DRAIN_TIMEOUT, self.inner.global.wait_drained()).await;
            if drained.is_err() {
                warn!(outstanding = self.inner.global.count(), "global references still held");
            }
            self.destroy_stations().await;
        }
        self.inner.pool.close();

        let monitor = self
            .inner
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(monitor) = monitor {
            if let Err(e) = monitor.await {
                error!(error = %e, "center monitor aborted");
            }
        }

        state.set_application(ApplicationState::Disposed);
        info!("application shut down");
        self.inner.exited.send_replace(true);
    }

    /// Waits until [`shutdown`](Self::shutdown) has completed.
    pub async fn wait_for_shutdown(&self) {
        let mut exited = self.inner.exited.subscribe();
        // the sender lives as long as `self`
        let _ = exited.wait_for(|done| *done).await;
    }
}

#[async_trait]
impl MonitorActions for ZeroApplication {
    async fn center_down(&self, center: CenterState) {
        self.inner.state.set_center(center);
        self.end_stations().await;
        self.inner.state.advance(ApplicationState::Failed);
    }

    async fn station_changed(&self, station: &str) {
        self.inner.configs.invalidate(station);
        self.inner.pool.invalidate(station);

        let Some(local) = self.station(station) else {
            return;
        };
        if local.is_running() {
            local.close().await;
        }
        if self.inner.state.in_run() {
            if let Err(e) = self.start_station(local).await {
                warn!(station, error = %e, "station not restarted");
            }
        }
    }

    async fn station_closed(&self, station: &str) {
        if let Some(local) = self.station(station) {
            info!(station, "center closed station");
            local.close().await;
        }
    }

    fn config_changed(&self, station: &str) {
        self.inner.configs.invalidate(station);
        self.inner.pool.invalidate(station);
    }

    fn forward(&self, item: &PublishItem) {
        self.emit(ZeroNetEvent::Center(item.clone()));
    }

    async fn rejoin(&self) -> bool {
        self.join_center().await
    }
}

//! Handlers for center broadcasts, one per coarse application phase.
//!
//! | application state                                   | variant   |
//! |-----------------------------------------------------|-----------|
//! | None, ConfigError, Initialized, Start, BeginRun,    | `Empty`   |
//! | Closing, Closed, Destroy, Disposed                  |           |
//! | Failed                                              | `Failed`  |
//! | Run, Pause                                          | `Running` |

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};
use zeronet_common::{PublishItem, ZeroNetEventType};

use crate::state::{ApplicationState, CenterState, StateObserver};

/// Effects the state machine variants can have on the application.
#[async_trait]
pub trait MonitorActions: Send + Sync {
    /// The center went away: record `center`, run the end notifications and
    /// mark the application failed.
    async fn center_down(&self, center: CenterState);

    /// A station was (re)registered or resumed at the center.
    async fn station_changed(&self, station: &str);

    /// A station was paused, stopped or removed at the center.
    async fn station_closed(&self, station: &str);

    /// A station's configuration changed.
    fn config_changed(&self, station: &str);

    /// Hands the event to application listeners.
    fn forward(&self, item: &PublishItem);

    /// Joins the center again; returns whether it succeeded.
    async fn rejoin(&self) -> bool;
}

/// Which variant is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineKind {
    Empty,
    Failed,
    Running,
}

impl MachineKind {
    pub fn for_state(state: ApplicationState) -> Self {
        match state {
            ApplicationState::None
            | ApplicationState::ConfigError
            | ApplicationState::Initialized
            | ApplicationState::Start
            | ApplicationState::BeginRun
            | ApplicationState::Closing
            | ApplicationState::Closed
            | ApplicationState::Destroy
            | ApplicationState::Disposed => MachineKind::Empty,
            ApplicationState::Failed => MachineKind::Failed,
            ApplicationState::Run | ApplicationState::Pause => MachineKind::Running,
        }
    }
}

/// State of the `Failed` variant: at most one recovery in flight.
#[derive(Debug, Clone, Default)]
pub struct FailedMachine {
    recovering: Arc<AtomicBool>,
    disposed: Arc<AtomicBool>,
}

impl FailedMachine {
    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::Acquire)
    }

    async fn on_message_push(&self, item: &PublishItem, actions: &Arc<dyn MonitorActions>) {
        let center_alive = matches!(
            item.event,
            ZeroNetEventType::CenterSystemStart
                | ZeroNetEventType::CenterWorkerSoundOff
                | ZeroNetEventType::CenterStationJoin
        );
        if !center_alive || self.disposed.load(Ordering::Acquire) {
            return;
        }
        if self
            .recovering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        info!(event = ?item.event, "center is back, rejoining");
        let actions = actions.clone();
        let recovering = self.recovering.clone();
        tokio::spawn(async move {
            let joined = actions.rejoin().await;
            debug!(joined, "recovery attempt finished");
            recovering.store(false, Ordering::Release);
        });
    }
}

/// The installed broadcast handler.
#[derive(Debug, Clone)]
pub enum MonitorStateMachine {
    /// Startup and shutdown windows: every event is ignored.
    Empty,
    /// Waits for signs of a live center and schedules a rejoin.
    Failed(FailedMachine),
    /// Keeps local stations in line with the center.
    Running,
}

impl MonitorStateMachine {
    fn new(kind: MachineKind) -> Self {
        match kind {
            MachineKind::Empty => MonitorStateMachine::Empty,
            MachineKind::Failed => MonitorStateMachine::Failed(FailedMachine::default()),
            MachineKind::Running => MonitorStateMachine::Running,
        }
    }

    pub fn kind(&self) -> MachineKind {
        match self {
            MonitorStateMachine::Empty => MachineKind::Empty,
            MonitorStateMachine::Failed(_) => MachineKind::Failed,
            MonitorStateMachine::Running => MachineKind::Running,
        }
    }

    fn dispose(&self) {
        if let MonitorStateMachine::Failed(machine) = self {
            machine.dispose();
        }
    }

    /// Reacts to one broadcast event.
    pub async fn on_message_push(&self, item: &PublishItem, actions: &Arc<dyn MonitorActions>) {
        match self {
            MonitorStateMachine::Empty => {}
            MonitorStateMachine::Failed(machine) => machine.on_message_push(item, actions).await,
            MonitorStateMachine::Running => Self::running(item, actions).await,
        }
    }

    async fn running(item: &PublishItem, actions: &Arc<dyn MonitorActions>) {
        let station = item.sub_title.as_deref().unwrap_or_default();
        match item.event {
            ZeroNetEventType::CenterSystemClosing | ZeroNetEventType::CenterSystemStop => {
                actions.center_down(CenterState::Stop).await
            }
            ZeroNetEventType::CenterStationJoin
            | ZeroNetEventType::CenterStationUpdate
            | ZeroNetEventType::CenterStationResume
            | ZeroNetEventType::CenterStationInstall => actions.station_changed(station).await,
            ZeroNetEventType::CenterStationPause
            | ZeroNetEventType::CenterStationLeft
            | ZeroNetEventType::CenterStationClosing
            | ZeroNetEventType::CenterStationStop
            | ZeroNetEventType::CenterStationRemove => actions.station_closed(station).await,
            ZeroNetEventType::CenterConfigUpdate => actions.config_changed(station),
            _ => {}
        }
        actions.forward(item);
    }
}

/// Holder of the installed variant, switched on application state changes.
pub struct MachineSlot {
    current: Mutex<MonitorStateMachine>,
    swaps: AtomicUsize,
}

impl MachineSlot {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(MonitorStateMachine::Empty),
            swaps: AtomicUsize::new(0),
        }
    }

    /// The installed variant.
    pub fn current(&self) -> MonitorStateMachine {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn kind(&self) -> MachineKind {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).kind()
    }

    /// Number of variant switches so far.
    pub fn swap_count(&self) -> usize {
        self.swaps.load(Ordering::Acquire)
    }

    /// Installs the variant for `state`, disposing the previous one.
    ///
    /// Returns `false` when the right variant is already installed.
    pub fn select(&self, state: ApplicationState) -> bool {
        let kind = MachineKind::for_state(state);
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.kind() == kind {
            return false;
        }

        let previous = std::mem::replace(&mut *current, MonitorStateMachine::new(kind));
        previous.dispose();
        self.swaps.fetch_add(1, Ordering::AcqRel);
        debug!(from = ?previous.kind(), to = ?kind, "monitor state machine switched");
        true
    }
}

impl Default for MachineSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl StateObserver for MachineSlot {
    fn application_changed(&self, _previous: ApplicationState, current: ApplicationState) {
        self.select(current);
    }
}

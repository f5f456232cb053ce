//! Process lifecycle state.
//!
//! Two independent axes: the application state and the reachability of the
//! center. Both are plain atomics behind a cloneable [`StateHolder`], so
//! tests can run several independent applications in one process.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;
use zeronet_client::Readiness;

/// Application lifecycle state, in lifecycle order.
///
/// `Destroy` and `Disposed` are terminal. `Failed` can be entered from any
/// in-flight state and is left again by a successful rejoin or by shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ApplicationState {
    None = 0,
    ConfigError = 1,
    Initialized = 2,
    Start = 3,
    BeginRun = 4,
    Run = 5,
    Pause = 6,
    Closing = 7,
    Closed = 8,
    Failed = 9,
    Destroy = 10,
    Disposed = 11,
}

impl ApplicationState {
    pub const ALL: [ApplicationState; 12] = [
        ApplicationState::None,
        ApplicationState::ConfigError,
        ApplicationState::Initialized,
        ApplicationState::Start,
        ApplicationState::BeginRun,
        ApplicationState::Run,
        ApplicationState::Pause,
        ApplicationState::Closing,
        ApplicationState::Closed,
        ApplicationState::Failed,
        ApplicationState::Destroy,
        ApplicationState::Disposed,
    ];

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(ApplicationState::None)
    }
}

/// Reachability of the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CenterState {
    None = 0,
    Start = 1,
    Run = 2,
    Failed = 3,
    Stop = 4,
}

impl CenterState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CenterState::Start,
            2 => CenterState::Run,
            3 => CenterState::Failed,
            4 => CenterState::Stop,
            _ => CenterState::None,
        }
    }
}

/// How the process takes part in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkModel {
    /// Full service: registers with the center and runs the event monitor.
    #[default]
    Service,
    /// Caller only: loads station configs but registers nothing.
    Client,
    /// Pass-through bridge: no registration, no config load, no monitor.
    Bridge,
}

/// Callback for application state changes.
///
/// Called synchronously by the thread that made the change, after the new
/// value is visible. Changes are delivered one at a time in the order they
/// were made; an observer must not change the application state itself.
pub trait StateObserver: Send + Sync {
    fn application_changed(&self, previous: ApplicationState, current: ApplicationState);
}

struct StateInner {
    application: AtomicU8,
    center: AtomicU8,
    work_model: WorkModel,
    observers: Mutex<Vec<Arc<dyn StateObserver>>>,
    /// Held across a transition and its notifications.
    transition: Mutex<()>,
    changes: watch::Sender<ApplicationState>,
}

/// Shared handle on the lifecycle state.
#[derive(Clone)]
pub struct StateHolder {
    inner: Arc<StateInner>,
}

impl StateHolder {
    pub fn new(work_model: WorkModel) -> Self {
        let (changes, _) = watch::channel(ApplicationState::None);
        Self {
            inner: Arc::new(StateInner {
                application: AtomicU8::new(ApplicationState::None as u8),
                center: AtomicU8::new(CenterState::None as u8),
                work_model,
                observers: Mutex::new(Vec::new()),
                transition: Mutex::new(()),
                changes,
            }),
        }
    }

    pub fn work_model(&self) -> WorkModel {
        self.inner.work_model
    }

    pub fn application(&self) -> ApplicationState {
        ApplicationState::from_u8(self.inner.application.load(Ordering::Acquire))
    }

    pub fn center(&self) -> CenterState {
        CenterState::from_u8(self.inner.center.load(Ordering::Acquire))
    }

    /// Sets the application state and returns the previous one.
    pub fn set_application(&self, state: ApplicationState) -> ApplicationState {
        let _transition = self.lock_transition();
        let previous =
            ApplicationState::from_u8(self.inner.application.swap(state as u8, Ordering::AcqRel));
        self.changed(previous, state);
        previous
    }

    /// Atomically replaces the application state when `f` returns a new one.
    ///
    /// Returns the previous state on success, or the unchanged current state
    /// when `f` declined.
    pub fn update_application<F>(
        &self,
        mut f: F,
    ) -> std::result::Result<ApplicationState, ApplicationState>
    where
        F: FnMut(ApplicationState) -> Option<ApplicationState>,
    {
        let _transition = self.lock_transition();
        let mut next = ApplicationState::None;
        let result = self
            .inner
            .application
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                f(ApplicationState::from_u8(current)).map(|state| {
                    next = state;
                    state as u8
                })
            })
            .map(ApplicationState::from_u8)
            .map_err(ApplicationState::from_u8);

        if let Ok(previous) = result {
            self.changed(previous, next);
        }
        result
    }

    /// Sets the application state unless teardown has begun.
    ///
    /// Returns whether the state was written. `Destroy` and `Disposed` are
    /// never left through this call.
    pub fn advance(&self, state: ApplicationState) -> bool {
        self.update_application(|current| (current < ApplicationState::Destroy).then_some(state))
            .is_ok()
    }

    pub fn set_center(&self, state: CenterState) -> CenterState {
        let previous = CenterState::from_u8(self.inner.center.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            info!(from = ?previous, to = ?state, "center state changed");
        }
        previous
    }

    /// Sets both axes to `Failed`, unless teardown has begun.
    pub fn set_failed(&self) -> bool {
        if !self.advance(ApplicationState::Failed) {
            return false;
        }
        self.set_center(CenterState::Failed);
        true
    }

    /// Registers an observer of application state changes.
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Receiver that sees every application state change.
    pub fn subscribe(&self) -> watch::Receiver<ApplicationState> {
        self.inner.changes.subscribe()
    }

    fn lock_transition(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .transition
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn changed(&self, previous: ApplicationState, current: ApplicationState) {
        if previous == current {
            return;
        }
        info!(from = ?previous, to = ?current, "application state changed");

        let observers = self
            .inner
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            observer.application_changed(previous, current);
        }
        self.inner.changes.send_replace(current);
    }

    /// The local application is starting or running.
    pub fn application_running(&self) -> bool {
        matches!(
            self.application(),
            ApplicationState::BeginRun | ApplicationState::Run
        )
    }

    /// The center is reachable, or this process does not depend on it.
    pub fn center_running(&self) -> bool {
        self.work_model() != WorkModel::Service || self.center() == CenterState::Run
    }

    /// Both the application and the center are healthy.
    pub fn can_operate(&self) -> bool {
        self.application_running() && self.center_running()
    }

    /// Teardown has not begun.
    pub fn alive(&self) -> bool {
        self.application() < ApplicationState::Destroy
    }

    pub fn closed(&self) -> bool {
        self.application() >= ApplicationState::Closed
    }

    pub fn in_run(&self) -> bool {
        self.application() == ApplicationState::Run
    }

    pub fn disposed(&self) -> bool {
        self.application() == ApplicationState::Disposed
    }
}

impl Readiness for StateHolder {
    fn can_operate(&self) -> bool {
        StateHolder::can_operate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_predicates_for_every_state() {
        let state = StateHolder::new(WorkModel::Service);
        state.set_center(CenterState::Run);

        for s in ApplicationState::ALL {
            state.set_application(s);
            let running = matches!(s, ApplicationState::BeginRun | ApplicationState::Run);
            assert_eq!(state.application_running(), running, "{:?}", s);
            assert_eq!(state.can_operate(), running, "{:?}", s);
            assert_eq!(state.alive(), s < ApplicationState::Destroy, "{:?}", s);
            assert_eq!(state.closed(), s >= ApplicationState::Closed, "{:?}", s);
        }

        state.set_application(ApplicationState::Destroy);
        assert!(!state.alive());
        state.set_application(ApplicationState::Run);
        assert!(state.alive());
    }

    #[test]
    fn test_center_gates_only_service_mode() {
        let service = StateHolder::new(WorkModel::Service);
        service.set_application(ApplicationState::Run);
        assert!(!service.can_operate());
        service.set_center(CenterState::Run);
        assert!(service.can_operate());
        service.set_center(CenterState::Failed);
        assert!(!service.can_operate());

        let client = StateHolder::new(WorkModel::Client);
        client.set_application(ApplicationState::Run);
        assert!(client.center_running());
        assert!(client.can_operate());
    }

    #[test]
    fn test_set_failed_sets_both_axes() {
        let state = StateHolder::new(WorkModel::Service);
        state.set_application(ApplicationState::Run);
        state.set_center(CenterState::Run);

        state.set_failed();
        assert_eq!(state.application(), ApplicationState::Failed);
        assert_eq!(state.center(), CenterState::Failed);
    }

    struct Counter(AtomicUsize);

    impl StateObserver for Counter {
        fn application_changed(&self, _previous: ApplicationState, _current: ApplicationState) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observer_sees_changes_only() {
        let state = StateHolder::new(WorkModel::Service);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        state.add_observer(counter.clone());

        state.set_application(ApplicationState::Start);
        state.set_application(ApplicationState::Start);
        state.set_application(ApplicationState::Run);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_update_application_guard() {
        let state = StateHolder::new(WorkModel::Service);
        state.set_application(ApplicationState::Run);

        let refused = state.update_application(|s| {
            (s != ApplicationState::Run).then_some(ApplicationState::BeginRun)
        });
        assert_eq!(refused, Err(ApplicationState::Run));

        state.set_application(ApplicationState::Failed);
        let accepted = state.update_application(|s| {
            (s != ApplicationState::Run).then_some(ApplicationState::BeginRun)
        });
        assert_eq!(accepted, Ok(ApplicationState::Failed));
        assert_eq!(state.application(), ApplicationState::BeginRun);
    }

    #[test]
    fn test_teardown_states_are_terminal() {
        let state = StateHolder::new(WorkModel::Service);
        assert!(state.advance(ApplicationState::Run));
        assert!(state.set_failed());

        for terminal in [ApplicationState::Destroy, ApplicationState::Disposed] {
            state.set_application(terminal);
            state.set_center(CenterState::Run);
            assert!(!state.advance(ApplicationState::Run));
            assert!(!state.set_failed());
            assert_eq!(state.application(), terminal);
            assert_eq!(state.center(), CenterState::Run);
        }
    }

    /// Records every notification; dawdles on `Failed`.
    struct SlowRecorder(Mutex<Vec<ApplicationState>>);

    impl StateObserver for SlowRecorder {
        fn application_changed(&self, _previous: ApplicationState, current: ApplicationState) {
            if current == ApplicationState::Failed {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            self.0.lock().unwrap().push(current);
        }
    }

    #[test]
    fn test_concurrent_changes_notify_in_order() {
        let state = StateHolder::new(WorkModel::Service);
        state.set_application(ApplicationState::Run);
        let recorder = Arc::new(SlowRecorder(Mutex::new(Vec::new())));
        state.add_observer(recorder.clone());

        let failing = {
            let state = state.clone();
            std::thread::spawn(move || state.set_application(ApplicationState::Failed))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        let rejoining = {
            let state = state.clone();
            std::thread::spawn(move || state.set_application(ApplicationState::BeginRun))
        };
        failing.join().unwrap();
        rejoining.join().unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![ApplicationState::Failed, ApplicationState::BeginRun]
        );
        assert_eq!(state.application(), ApplicationState::BeginRun);
    }

    #[tokio::test]
    async fn test_watch_receives_latest_state() {
        let state = StateHolder::new(WorkModel::Bridge);
        let mut changes = state.subscribe();

        state.set_application(ApplicationState::Run);
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), ApplicationState::Run);
    }
}

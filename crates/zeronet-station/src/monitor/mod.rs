//! Center event monitor.
//!
//! Subscribes to the center's broadcast channel, fails the application when
//! the channel stays silent for too long, and hands every event to the
//! installed [`MonitorStateMachine`].

pub mod machine;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use zeronet_common::PublishItem;

use crate::config::MonitorConfig;
use crate::state::{CenterState, StateHolder};
use crate::station::SubscriberFactory;

pub use machine::{MachineKind, MachineSlot, MonitorActions, MonitorStateMachine};

/// Why a monitoring session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The application is shutting down.
    Stopped,
    /// No message arrived within the silence threshold.
    Silent,
}

/// Long-running monitor of the center's broadcast channel.
pub struct EventMonitor {
    endpoint: String,
    state: StateHolder,
    machine: Arc<MachineSlot>,
    actions: Arc<dyn MonitorActions>,
    subscribers: SubscriberFactory,
    config: MonitorConfig,
}

impl EventMonitor {
    pub fn new(
        endpoint: impl Into<String>,
        state: StateHolder,
        machine: Arc<MachineSlot>,
        actions: Arc<dyn MonitorActions>,
        subscribers: SubscriberFactory,
        config: MonitorConfig,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            state,
            machine,
            actions,
            subscribers,
            config,
        }
    }

    /// Starts the monitor task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Runs sessions until the application is no longer alive.
    ///
    /// A silent session marks the center failed, runs the end notifications,
    /// marks the application failed and starts over after a short pause.
    pub async fn run(self) {
        info!(endpoint = %self.endpoint, "center monitor started");
        while self.state.alive() {
            if self.session().await == SessionEnd::Stopped {
                break;
            }
            error!(
                endpoint = %self.endpoint,
                silence_ms = self.config.silence_threshold_ms,
                "center monitor failed: no message for a long time"
            );
            self.actions.center_down(CenterState::Failed).await;
            tokio::time::sleep(self.config.failure_backoff()).await;
        }
        info!("center monitor stopped");
    }

    /// One subscription to the broadcast channel.
    pub async fn session(&self) -> SessionEnd {
        let mut subscriber = (self.subscribers)(&self.endpoint, "");
        let mut changes = self.state.subscribe();
        let mut silent_since: Option<Instant> = None;

        while self.state.alive() {
            let polled = tokio::select! {
                polled = subscriber.poll(self.config.poll_timeout()) => polled,
                _ = changes.changed() => continue,
            };

            let frames = match polled {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(error = %e, "monitor poll failed");
                    None
                }
            };
            let Some(frames) = frames else {
                let now = Instant::now();
                match silent_since {
                    None => silent_since = Some(now),
                    Some(since) if now - since > self.config.silence_threshold() => {
                        return SessionEnd::Silent;
                    }
                    Some(_) => {}
                }
                continue;
            };

            silent_since = None;
            let item = match PublishItem::unpack(&frames) {
                Ok(item) => item,
                Err(e) => {
                    debug!(error = %e, "skipping undecodable broadcast");
                    continue;
                }
            };
            if !item.event.is_chatty() {
                info!(event = ?item.event, station = ?item.sub_title, "center event");
            }
            self.machine
                .current()
                .on_message_push(&item, &self.actions)
                .await;
        }
        SessionEnd::Stopped
    }
}

//! Shared fakes for the station integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use zeronet_client::CommandResult;
use zeronet_common::transport::Subscriber;
use zeronet_common::{RemoteStatus, StationConfig, StationKind};
use zeronet_station::station::SubscriberFactory;
use zeronet_station::{CenterClient, Result};

/// Center whose answers are switched by flags; records every call.
pub struct FakeCenter {
    pub ping_ok: AtomicBool,
    pub join_ok: AtomicBool,
    pub load_ok: AtomicBool,
    /// Delay before each ping answers
    pub ping_delay_ms: AtomicU64,
    pub configs: Mutex<Vec<StationConfig>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ping_ok: AtomicBool::new(true),
            join_ok: AtomicBool::new(true),
            load_ok: AtomicBool::new(true),
            ping_delay_ms: AtomicU64::new(0),
            configs: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_station(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.configs.lock().unwrap().push(
            StationConfig::new(name, StationKind::Notify)
                .with_worker_call_address(format!("tcp://{}", name.to_lowercase())),
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl CenterClient for FakeCenter {
    async fn ping(&self) -> Result<bool> {
        self.record("ping");
        let delay = self.ping_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.ping_ok.load(Ordering::SeqCst))
    }

    async fn heart_join(&self, _station: &str, _real_name: &str) -> Result<bool> {
        self.record("heart_join");
        Ok(self.join_ok.load(Ordering::SeqCst))
    }

    async fn heart_ready(&self, _station: &str, _real_name: &str) -> Result<bool> {
        self.record("heart_ready");
        Ok(true)
    }

    async fn heart_left(&self, _station: &str, _real_name: &str) -> Result<bool> {
        self.record("heart_left");
        Ok(true)
    }

    async fn load_all_config(&self) -> Result<Vec<StationConfig>> {
        self.record("load_all_config");
        if self.load_ok.load(Ordering::SeqCst) {
            Ok(self.configs.lock().unwrap().clone())
        } else {
            Err(zeronet_common::ZeroError::Connection("refused".to_string()).into())
        }
    }

    async fn host(&self, station: &str) -> Result<Option<StationConfig>> {
        self.record("host");
        Ok(self
            .configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(station))
            .cloned())
    }

    async fn upload_document(&self, _station: &str, _document: &str) -> Result<bool> {
        self.record("upload_document");
        Ok(true)
    }

    async fn call_command(&self, command: &str, _args: &[&str]) -> Result<CommandResult> {
        self.record(command);
        Ok(CommandResult {
            state: RemoteStatus::Ok,
            text: None,
        })
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<Bytes>>>>;

/// In-memory broadcast channels keyed by endpoint.
#[derive(Clone, Default)]
pub struct FakeBus {
    channels: Arc<Mutex<HashMap<String, (mpsc::UnboundedSender<Vec<Bytes>>, SharedReceiver)>>>,
}

impl FakeBus {
    fn channel(&self, endpoint: &str) -> (mpsc::UnboundedSender<Vec<Bytes>>, SharedReceiver) {
        self.channels
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Arc::new(tokio::sync::Mutex::new(rx)))
            })
            .clone()
    }

    pub fn send(&self, endpoint: &str, frames: Vec<Bytes>) {
        self.channel(endpoint).0.send(frames).unwrap();
    }

    pub fn factory(&self) -> SubscriberFactory {
        let bus = self.clone();
        Arc::new(move |endpoint: &str, _prefix: &str| {
            Box::new(ChannelSubscriber {
                receiver: bus.channel(endpoint).1,
            }) as Box<dyn Subscriber>
        })
    }
}

pub struct ChannelSubscriber {
    receiver: SharedReceiver,
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn poll(&mut self, timeout: Duration) -> zeronet_common::Result<Option<Vec<Bytes>>> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(frames)) => Ok(Some(frames)),
            Ok(None) | Err(_) => Ok(None),
        }
    }
}

/// Polls `condition` every 10 ms for up to two seconds.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

//! Broadcast channel: one [`Publisher`] fanning messages out to many
//! subscribers, filtered by topic prefix.
//!
//! A subscriber announces its prefix with a single-frame message right after
//! connecting. After that the connection only carries publisher messages.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::protocol::error::Result;
use crate::protocol::publish::PublishItem;
use crate::transport::tcp::{FrameListener, FrameTransport, TcpFrameTransport};

/// Messages queued per subscriber before new ones are dropped.
const SUBSCRIBER_QUEUE: usize = 1024;

/// First pause after a failed accept; doubles per consecutive failure.
const ACCEPT_RETRY_BASE: Duration = Duration::from_millis(10);

/// Longest pause between accept attempts.
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// Pause before the next accept after `failures` consecutive failures.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_RETRY_BASE
        .saturating_mul(1u32 << failures.saturating_sub(1).min(16))
        .min(ACCEPT_RETRY_MAX)
}

/// Receiving end of a broadcast channel.
#[async_trait]
pub trait Subscriber: Send {
    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when nothing arrived in time, including while the
    /// publisher is unreachable.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>>;
}

/// TCP subscriber that connects lazily and reconnects after losing the
/// publisher.
pub struct TcpSubscriber {
    endpoint: String,
    prefix: Bytes,
    connect_timeout: Duration,
    transport: Option<TcpFrameTransport>,
}

impl TcpSubscriber {
    /// Creates a subscriber; no connection is made until the first poll.
    ///
    /// An empty `prefix` receives every message.
    pub fn new(endpoint: impl Into<String>, prefix: impl Into<Bytes>) -> Self {
        Self {
            endpoint: endpoint.into(),
            prefix: prefix.into(),
            connect_timeout: crate::transport::tcp::DEFAULT_CONNECT_TIMEOUT,
            transport: None,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    async fn ensure_connected(&mut self, deadline: Instant) -> Option<&mut TcpFrameTransport> {
        if self.transport.is_none() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout = remaining.min(self.connect_timeout);
            match TcpFrameTransport::connect_timeout(&self.endpoint, timeout).await {
                Ok(mut transport) => match transport.send_frames(vec![self.prefix.clone()]).await {
                    Ok(()) => {
                        debug!(endpoint = %self.endpoint, "subscriber connected");
                        self.transport = Some(transport);
                    }
                    Err(e) => warn!(endpoint = %self.endpoint, error = %e, "subscribe failed"),
                },
                Err(e) => debug!(endpoint = %self.endpoint, error = %e, "publisher unreachable"),
            }
        }
        self.transport.as_mut()
    }
}

#[async_trait]
impl Subscriber for TcpSubscriber {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>> {
        let deadline = Instant::now() + timeout;

        let transport = match self.ensure_connected(deadline).await {
            Some(transport) => transport,
            None => {
                tokio::time::sleep_until(deadline).await;
                return Ok(None);
            }
        };

        let received = tokio::time::timeout_at(deadline, transport.recv_frames()).await;
        match received {
            Err(_) => Ok(None),
            Ok(Ok(frames)) => Ok(Some(frames)),
            Ok(Err(e)) => {
                warn!(endpoint = %self.endpoint, error = %e, "subscriber lost publisher");
                self.transport = None;
                tokio::time::sleep_until(deadline).await;
                Ok(None)
            }
        }
    }
}

struct Subscription {
    prefix: Bytes,
    sender: mpsc::Sender<Vec<Bytes>>,
}

/// Broadcast endpoint.
///
/// # Example
///
/// ```no_run
/// use zeronet_common::protocol::{PublishItem, ZeroNetEventType};
/// use zeronet_common::transport::Publisher;
///
/// # #[tokio::main]
/// # async fn main() -> zeronet_common::Result<()> {
/// let publisher = Publisher::bind("tcp://127.0.0.1:0").await?;
/// let delivered = publisher.publish(PublishItem::new("orders", ZeroNetEventType::None));
/// # Ok(())
/// # }
/// ```
pub struct Publisher {
    endpoint: String,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    accept_task: JoinHandle<()>,
}

impl Publisher {
    /// Binds and starts accepting subscribers.
    pub async fn bind(endpoint: &str) -> Result<Self> {
        let listener = FrameListener::bind(endpoint).await?;
        let endpoint = listener.endpoint()?;
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        let accept_task = tokio::spawn(Self::accept_loop(listener, subscriptions.clone()));

        Ok(Self {
            endpoint,
            subscriptions,
            accept_task,
        })
    }

    async fn accept_loop(listener: FrameListener, subscriptions: Arc<Mutex<Vec<Subscription>>>) {
        let mut failures = 0u32;
        loop {
            let mut transport = match listener.accept().await {
                Ok(transport) => {
                    failures = 0;
                    transport
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let pause = accept_backoff(failures);
                    warn!(error = %e, failures, pause_ms = pause.as_millis() as u64, "publisher accept failed");
                    tokio::time::sleep(pause).await;
                    continue;
                }
            };

            let subscriptions = subscriptions.clone();
            tokio::spawn(async move {
                let prefix = match transport.recv_frames().await {
                    Ok(frames) => frames.into_iter().next().unwrap_or_default(),
                    Err(e) => {
                        debug!(error = %e, "subscriber left before subscribing");
                        return;
                    }
                };

                let (sender, mut receiver) = mpsc::channel(SUBSCRIBER_QUEUE);
                subscriptions
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(Subscription { prefix, sender });

                while let Some(frames) = receiver.recv().await {
                    if let Err(e) = transport.send_frames(frames).await {
                        debug!(peer = transport.endpoint(), error = %e, "subscriber dropped");
                        break;
                    }
                }
            });
        }
    }

    /// The bound endpoint, as `tcp://host:port`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subscriptions.retain(|s| !s.sender.is_closed());
        subscriptions.len()
    }

    /// Publishes an item; returns how many subscribers it was queued for.
    pub fn publish(&self, item: PublishItem) -> usize {
        self.publish_frames(item.into_frames())
    }

    /// Publishes raw frames; frame 0 is matched against subscriber prefixes.
    pub fn publish_frames(&self, frames: Vec<Bytes>) -> usize {
        let title = frames.first().cloned().unwrap_or_default();
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subscriptions.retain(|s| !s.sender.is_closed());

        let mut delivered = 0;
        for subscription in subscriptions.iter() {
            if !title.starts_with(&subscription.prefix) {
                continue;
            }
            match subscription.sender.try_send(frames.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("subscriber queue full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.accept_task.abort();
        // closes every subscriber connection
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

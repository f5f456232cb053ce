use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use zeronet_common::{PublishItem, StationKind};

use crate::error::{Result, StationError};
use crate::station::{StationContext, ZeroStation};

/// Business handler of a [`SubStation`].
#[async_trait]
pub trait PublishHandler: Send + Sync + 'static {
    /// Handles one broadcast message.
    ///
    /// Errors and panics are logged with the message content and never stop
    /// the station.
    async fn handle(&self, context: &HandlerContext, item: PublishItem) -> anyhow::Result<()>;

    /// Called whenever a poll times out without a message.
    async fn idle(&self) {}
}

/// Per-message context restored from the publish item.
///
/// Lives exactly as long as one handler invocation.
#[derive(Debug)]
pub struct HandlerContext {
    pub station: String,
    pub publisher: Option<String>,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

impl HandlerContext {
    fn restore(station: &str, item: &PublishItem) -> Self {
        Self {
            station: station.to_string(),
            publisher: item.publisher.clone(),
            request_id: item.request_id.clone(),
            context: item.context.clone(),
        }
    }
}

impl Drop for HandlerContext {
    fn drop(&mut self) {
        trace!(station = %self.station, request_id = ?self.request_id, "handler context released");
    }
}

/// Station that receives broadcast messages and hands them to a
/// [`PublishHandler`].
///
/// The loop subscribes to the station's worker call address with the
/// configured topic prefix and runs until [`close`](ZeroStation::close) or
/// process teardown. Messages that do not decode are skipped.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use zeronet_common::PublishItem;
/// use zeronet_station::station::{HandlerContext, PublishHandler, SubStation};
///
/// struct PrintOrders;
///
/// #[async_trait]
/// impl PublishHandler for PrintOrders {
///     async fn handle(&self, _context: &HandlerContext, item: PublishItem) -> anyhow::Result<()> {
///         println!("{:?}", item.content);
///         Ok(())
///     }
/// }
///
/// let station = SubStation::new("OrderEvents", PrintOrders).with_subscribe("orders");
/// ```
pub struct SubStation<H> {
    name: String,
    subscribe: String,
    handler: Arc<H>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<H: PublishHandler> SubStation<H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            subscribe: String::new(),
            handler: Arc::new(handler),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Sets the topic prefix; empty receives everything.
    pub fn with_subscribe(mut self, prefix: impl Into<String>) -> Self {
        self.subscribe = prefix.into();
        self
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

struct LoopParts<H> {
    name: String,
    subscribe: String,
    handler: Arc<H>,
    running: Arc<AtomicBool>,
}

impl<H: PublishHandler> LoopParts<H> {
    async fn run(self, context: StationContext) {
        let StationContext {
            config,
            real_name,
            center,
            state,
            subscribers,
            poll_timeout,
            global,
        } = context;

        info!(station = %self.name, real_name = %real_name, "station loop starting");
        if let Err(e) = center.heart_ready(&self.name, &real_name).await {
            warn!(station = %self.name, error = %e, "heart ready failed");
        }

        let mut subscriber = subscribers(&config.worker_call_address, &self.subscribe);
        while self.running.load(Ordering::Acquire) && state.alive() {
            match subscriber.poll(poll_timeout).await {
                Ok(Some(frames)) => match PublishItem::unpack(&frames) {
                    Ok(item) => {
                        self.dispatch(item).await;
                    }
                    Err(e) => debug!(station = %self.name, error = %e, "skipping undecodable message"),
                },
                Ok(None) => self.handler.idle().await,
                Err(e) => {
                    warn!(station = %self.name, error = %e, "poll failed");
                    self.handler.idle().await;
                }
            }
        }

        if let Err(e) = center.heart_left(&self.name, &real_name).await {
            warn!(station = %self.name, error = %e, "heart left failed");
        }
        self.running.store(false, Ordering::Release);
        drop(global);
        info!(station = %self.name, "station loop stopped");
    }

    /// Runs the handler for one message; returns whether it succeeded.
    async fn dispatch(&self, item: PublishItem) -> bool {
        let context = HandlerContext::restore(&self.name, &item);
        let content = item.content.clone();

        match AssertUnwindSafe(self.handler.handle(&context, item))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(station = %self.name, error = %e, content = ?content, "handler failed");
                false
            }
            Err(_) => {
                error!(station = %self.name, content = ?content, "handler panicked");
                false
            }
        }
    }
}

#[async_trait]
impl<H: PublishHandler> ZeroStation for SubStation<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StationKind {
        StationKind::Notify
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn start(&self, context: StationContext) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StationError::AlreadyRunning(self.name.clone()));
        }

        let parts = LoopParts {
            name: self.name.clone(),
            subscribe: self.subscribe.clone(),
            handler: self.handler.clone(),
            running: self.running.clone(),
        };
        let handle = tokio::spawn(parts.run(context));
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    async fn close(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(station = %self.name, error = %e, "station loop aborted");
            }
        }
    }
}

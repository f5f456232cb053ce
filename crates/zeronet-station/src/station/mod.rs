//! Locally hosted stations.

mod sub;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use zeronet_common::transport::{Subscriber, TcpSubscriber};
use zeronet_common::{StationConfig, StationKind};

use crate::center::CenterClient;
use crate::error::Result;
use crate::global::GlobalRef;
use crate::state::StateHolder;

pub use sub::{HandlerContext, PublishHandler, SubStation};

/// Opens a subscriber for an endpoint and topic prefix.
pub type SubscriberFactory = Arc<dyn Fn(&str, &str) -> Box<dyn Subscriber> + Send + Sync>;

/// Factory of lazily connecting TCP subscribers.
pub fn tcp_subscribers(connect_timeout: Duration) -> SubscriberFactory {
    Arc::new(move |endpoint: &str, prefix: &str| {
        let subscriber = TcpSubscriber::new(endpoint, prefix.to_string())
            .with_connect_timeout(connect_timeout);
        Box::new(subscriber) as Box<dyn Subscriber>
    })
}

/// Everything a station needs to run, handed over by the application.
pub struct StationContext {
    /// Descriptor of the station, as served by the center
    pub config: StationConfig,
    pub real_name: String,
    pub center: Arc<dyn CenterClient>,
    pub state: StateHolder,
    pub subscribers: SubscriberFactory,
    pub poll_timeout: Duration,
    /// Held for as long as the station runs
    pub global: GlobalRef,
}

/// A station hosted by this process.
///
/// The application starts every registered station once it has joined the
/// center and closes them when the center is lost or the process shuts
/// down.
#[async_trait]
pub trait ZeroStation: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> StationKind;

    fn is_running(&self) -> bool;

    /// Starts the station's loop and returns once it is spawned.
    ///
    /// # Errors
    ///
    /// [`StationError::AlreadyRunning`](crate::StationError::AlreadyRunning)
    /// if the loop is still running.
    async fn start(&self, context: StationContext) -> Result<()>;

    /// Stops the loop and waits for it to exit.
    async fn close(&self);

    /// Final teardown at process shutdown.
    async fn destroy(&self) {
        self.close().await;
    }
}

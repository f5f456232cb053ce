//! Management operations against the center.

use async_trait::async_trait;
use tracing::{debug, warn};
use zeronet_client::{CommandResult, ManageClient};
use zeronet_common::auth::ServiceKey;
use zeronet_common::{RemoteStatus, StationConfig};

use crate::error::{Result, StationError};

/// What the runtime needs from the center.
///
/// [`ZeroCenterClient`] is the network implementation; tests substitute a
/// scripted one.
#[async_trait]
pub trait CenterClient: Send + Sync {
    async fn ping(&self) -> Result<bool>;

    async fn heart_join(&self, station: &str, real_name: &str) -> Result<bool>;

    async fn heart_ready(&self, station: &str, real_name: &str) -> Result<bool>;

    async fn heart_left(&self, station: &str, real_name: &str) -> Result<bool>;

    /// Fetches the descriptors of every station the center knows.
    async fn load_all_config(&self) -> Result<Vec<StationConfig>>;

    /// Fetches one station descriptor; `None` if the station is not
    /// installed.
    async fn host(&self, station: &str) -> Result<Option<StationConfig>>;

    async fn upload_document(&self, station: &str, document: &str) -> Result<bool>;

    /// Runs an arbitrary management command.
    async fn call_command(&self, command: &str, args: &[&str]) -> Result<CommandResult>;
}

/// [`CenterClient`] over the center's management socket.
#[derive(Clone)]
pub struct ZeroCenterClient {
    manage: ManageClient,
}

impl ZeroCenterClient {
    pub fn new(endpoint: impl Into<String>, service_key: ServiceKey) -> Self {
        Self {
            manage: ManageClient::new(endpoint).with_service_key(service_key),
        }
    }

    pub fn from_manage(manage: ManageClient) -> Self {
        Self { manage }
    }

    fn rejected(command: &str, reply: &CommandResult) -> StationError {
        StationError::Rejected {
            command: command.to_string(),
            state: reply.state.to_string(),
        }
    }
}

#[async_trait]
impl CenterClient for ZeroCenterClient {
    async fn ping(&self) -> Result<bool> {
        Ok(self.manage.ping().await?)
    }

    async fn heart_join(&self, station: &str, real_name: &str) -> Result<bool> {
        Ok(self.manage.heart_join(station, real_name).await?)
    }

    async fn heart_ready(&self, station: &str, real_name: &str) -> Result<bool> {
        Ok(self.manage.heart_ready(station, real_name).await?)
    }

    async fn heart_left(&self, station: &str, real_name: &str) -> Result<bool> {
        Ok(self.manage.heart_left(station, real_name).await?)
    }

    async fn load_all_config(&self) -> Result<Vec<StationConfig>> {
        let reply = self.manage.call_command("host", &["*"]).await?;
        if !reply.is_ok() {
            return Err(Self::rejected("host *", &reply));
        }
        let configs: Vec<StationConfig> =
            serde_json::from_str(reply.text.as_deref().unwrap_or("[]"))?;
        debug!(count = configs.len(), "loaded station configs");
        Ok(configs)
    }

    async fn host(&self, station: &str) -> Result<Option<StationConfig>> {
        let reply = self.manage.call_command("host", &[station]).await?;
        match (reply.state, reply.text.as_deref()) {
            (RemoteStatus::Ok, Some(text)) => Ok(Some(serde_json::from_str(text)?)),
            (RemoteStatus::Ok, None) | (RemoteStatus::NotFind, _) => Ok(None),
            _ => Err(Self::rejected("host", &reply)),
        }
    }

    async fn upload_document(&self, station: &str, document: &str) -> Result<bool> {
        let reply = self.manage.call_command("doc", &[station, document]).await?;
        if !reply.is_ok() {
            warn!(station, state = %reply.state, "document upload rejected");
        }
        Ok(reply.is_ok())
    }

    async fn call_command(&self, command: &str, args: &[&str]) -> Result<CommandResult> {
        Ok(self.manage.call_command(command, args).await?)
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};
use zeronet_client::EndpointResolver;
use zeronet_common::StationConfig;

use crate::center::CenterClient;

/// Station descriptor cache, keyed case-insensitively by station name.
///
/// Entries are fetched from the center on a miss and kept until invalidated.
/// The registry also resolves request endpoints for the connection pool.
pub struct ConfigRegistry {
    configs: Mutex<HashMap<String, StationConfig>>,
    center: Arc<dyn CenterClient>,
}

impl ConfigRegistry {
    pub fn new(center: Arc<dyn CenterClient>) -> Self {
        Self {
            configs: Mutex::new(HashMap::new()),
            center,
        }
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    /// Cached descriptor, without fetching.
    pub fn cached(&self, name: &str) -> Option<StationConfig> {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&Self::key(name))
            .cloned()
    }

    /// Descriptor of `name`, fetched from the center on a miss.
    pub async fn get(&self, name: &str) -> Option<StationConfig> {
        if let Some(config) = self.cached(name) {
            return Some(config);
        }

        match self.center.host(name).await {
            Ok(Some(config)) => {
                debug!(station = name, "fetched station config");
                self.insert(config.clone());
                Some(config)
            }
            Ok(None) => {
                debug!(station = name, "station not installed");
                None
            }
            Err(e) => {
                warn!(station = name, error = %e, "failed to fetch station config");
                None
            }
        }
    }

    pub fn insert(&self, config: StationConfig) {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(Self::key(&config.name), config);
    }

    /// Replaces the whole cache, e.g. after loading every config at join.
    pub fn replace_all(&self, configs: Vec<StationConfig>) {
        let configs = configs
            .into_iter()
            .map(|config| (Self::key(&config.name), config))
            .collect();
        *self.configs.lock().unwrap_or_else(|e| e.into_inner()) = configs;
    }

    /// Drops one entry so the next lookup fetches it again.
    pub fn invalidate(&self, name: &str) -> bool {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&Self::key(name))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.configs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EndpointResolver for ConfigRegistry {
    async fn resolve(&self, station: &str) -> Option<String> {
        self.get(station)
            .await
            .map(|config| config.request_address)
            .filter(|address| !address.is_empty())
    }
}

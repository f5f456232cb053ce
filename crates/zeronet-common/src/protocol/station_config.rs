use serde::{Deserialize, Serialize};

/// Kind of a station, as registered with the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    #[default]
    None,
    Api,
    Notify,
    Dispatcher,
    Vote,
    Plan,
}

impl std::fmt::Display for StationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StationKind::None => "none",
            StationKind::Api => "api",
            StationKind::Notify => "notify",
            StationKind::Dispatcher => "dispatcher",
            StationKind::Vote => "vote",
            StationKind::Plan => "plan",
        };
        f.write_str(name)
    }
}

/// Descriptor of one station, as served by the center's `host` command.
///
/// Immutable once loaded; the registry re-fetches it only after an explicit
/// invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StationConfig {
    #[serde(rename = "station_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(rename = "station_type", default)]
    pub kind: StationKind,
    /// Address RPC callers send requests to.
    #[serde(default)]
    pub request_address: String,
    /// Address workers receive calls from; the broadcast address for
    /// `Notify` stations.
    #[serde(default)]
    pub worker_call_address: String,
    #[serde(default)]
    pub worker_result_address: String,
    /// Base stations are part of the center itself and cannot be removed.
    #[serde(default)]
    pub is_base_station: bool,
}

impl StationConfig {
    pub fn new(name: impl Into<String>, kind: StationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_request_address(mut self, address: impl Into<String>) -> Self {
        self.request_address = address.into();
        self
    }

    pub fn with_worker_call_address(mut self, address: impl Into<String>) -> Self {
        self.worker_call_address = address.into();
        self
    }
}

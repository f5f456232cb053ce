//! Remote status codes and their mapping onto client-visible results.
//!
//! [`RemoteStatus`] is what a worker or the center reports for a call. It is
//! richer than what callers need, so every status is folded into a
//! [`ClientResultKind`] by [`RemoteStatus::client_result`], and from there
//! into a serializable [`ApiResult`].

use serde::{Deserialize, Serialize};

use crate::protocol::error::{Result, ZeroError};

/// Outcome code reported by the remote side, or synthesized locally when the
/// call never reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RemoteStatus {
    Ok = 0x00,
    Plan = 0x01,
    Running = 0x02,
    VoteBye = 0x03,
    Wecome = 0x04,
    VoteSend = 0x05,
    VoteWaiting = 0x06,
    VoteStart = 0x07,
    VoteEnd = 0x08,
    VoteClose = 0x09,
    Error = 0x10,
    Failed = 0x11,
    NotFind = 0x12,
    NotSupport = 0x13,
    FrameInvalid = 0x14,
    ArgumentInvalid = 0x15,
    TimeOut = 0x16,
    NetError = 0x17,
    NoWorker = 0x18,
    Unavailable = 0x19,
    Bug = 0x1A,
    DenyAccess = 0x1B,
    Pause = 0x1C,
    LocalNoReady = 0xF0,
    LocalZmqError = 0xF1,
    LocalSendError = 0xF2,
    LocalRecvError = 0xF3,
    LocalException = 0xF4,
}

impl RemoteStatus {
    /// Every status, in code order.
    pub const ALL: [RemoteStatus; 28] = [
        RemoteStatus::Ok,
        RemoteStatus::Plan,
        RemoteStatus::Running,
        RemoteStatus::VoteBye,
        RemoteStatus::Wecome,
        RemoteStatus::VoteSend,
        RemoteStatus::VoteWaiting,
        RemoteStatus::VoteStart,
        RemoteStatus::VoteEnd,
        RemoteStatus::VoteClose,
        RemoteStatus::Error,
        RemoteStatus::Failed,
        RemoteStatus::NotFind,
        RemoteStatus::NotSupport,
        RemoteStatus::FrameInvalid,
        RemoteStatus::ArgumentInvalid,
        RemoteStatus::TimeOut,
        RemoteStatus::NetError,
        RemoteStatus::NoWorker,
        RemoteStatus::Unavailable,
        RemoteStatus::Bug,
        RemoteStatus::DenyAccess,
        RemoteStatus::Pause,
        RemoteStatus::LocalNoReady,
        RemoteStatus::LocalZmqError,
        RemoteStatus::LocalSendError,
        RemoteStatus::LocalRecvError,
        RemoteStatus::LocalException,
    ];

    /// Decodes a status byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| *status as u8 == value)
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Textual name used in informational results and logs.
    pub fn text(self) -> &'static str {
        match self {
            RemoteStatus::Ok => "Ok",
            RemoteStatus::Plan => "Plan",
            RemoteStatus::Running => "Running",
            RemoteStatus::VoteBye => "VoteBye",
            RemoteStatus::Wecome => "Wecome",
            RemoteStatus::VoteSend => "VoteSend",
            RemoteStatus::VoteWaiting => "VoteWaiting",
            RemoteStatus::VoteStart => "VoteStart",
            RemoteStatus::VoteEnd => "VoteEnd",
            RemoteStatus::VoteClose => "VoteClose",
            RemoteStatus::Error => "Error",
            RemoteStatus::Failed => "Failed",
            RemoteStatus::NotFind => "NotFind",
            RemoteStatus::NotSupport => "NotSupport",
            RemoteStatus::FrameInvalid => "FrameInvalid",
            RemoteStatus::ArgumentInvalid => "ArgumentInvalid",
            RemoteStatus::TimeOut => "TimeOut",
            RemoteStatus::NetError => "NetError",
            RemoteStatus::NoWorker => "NoWorker",
            RemoteStatus::Unavailable => "Unavailable",
            RemoteStatus::Bug => "Bug",
            RemoteStatus::DenyAccess => "DenyAccess",
            RemoteStatus::Pause => "Pause",
            RemoteStatus::LocalNoReady => "LocalNoReady",
            RemoteStatus::LocalZmqError => "LocalZmqError",
            RemoteStatus::LocalSendError => "LocalSendError",
            RemoteStatus::LocalRecvError => "LocalRecvError",
            RemoteStatus::LocalException => "LocalException",
        }
    }

    /// Returns true for statuses synthesized on the calling side.
    pub fn is_local(self) -> bool {
        self.as_u8() >= RemoteStatus::LocalNoReady.as_u8()
    }

    /// Folds this status into the client-facing taxonomy.
    ///
    /// The table is total: `VoteClose` is the one code without an explicit
    /// row and lands on [`ClientResultKind::RemoteEmpty`].
    pub fn client_result(self) -> ClientResultKind {
        match self {
            RemoteStatus::Ok => ClientResultKind::Ok,
            RemoteStatus::LocalNoReady | RemoteStatus::LocalZmqError => ClientResultKind::NoReady,
            RemoteStatus::LocalSendError
            | RemoteStatus::LocalRecvError
            | RemoteStatus::FrameInvalid
            | RemoteStatus::NetError => ClientResultKind::NetworkError,
            RemoteStatus::LocalException => ClientResultKind::LocalException,
            RemoteStatus::Plan
            | RemoteStatus::Running
            | RemoteStatus::VoteBye
            | RemoteStatus::Wecome
            | RemoteStatus::VoteSend
            | RemoteStatus::VoteWaiting
            | RemoteStatus::VoteStart
            | RemoteStatus::VoteEnd => ClientResultKind::Informational(self.text()),
            RemoteStatus::Error => ClientResultKind::InnerError,
            RemoteStatus::Unavailable => ClientResultKind::Unavailable,
            RemoteStatus::NotSupport | RemoteStatus::NotFind | RemoteStatus::NoWorker => {
                ClientResultKind::NotFound
            }
            RemoteStatus::ArgumentInvalid => ClientResultKind::ArgumentError,
            RemoteStatus::TimeOut => ClientResultKind::TimeOut,
            RemoteStatus::Failed | RemoteStatus::Bug => ClientResultKind::LogicalError,
            RemoteStatus::Pause => ClientResultKind::Pause,
            RemoteStatus::DenyAccess => ClientResultKind::DenyAccess,
            RemoteStatus::VoteClose => ClientResultKind::RemoteEmpty,
        }
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

impl TryFrom<u8> for RemoteStatus {
    type Error = ZeroError;

    fn try_from(value: u8) -> std::result::Result<RemoteStatus, ZeroError> {
        RemoteStatus::from_u8(value).ok_or(ZeroError::UnknownStatus(value))
    }
}

/// Numeric error codes carried in [`ApiStatus::code`].
pub mod error_code {
    pub const SUCCESS: i32 = 0;
    pub const LOGICAL_ERROR: i32 = -1;
    pub const ARGUMENT_ERROR: i32 = -2;
    pub const INNER_ERROR: i32 = -4;
    pub const NOT_FIND: i32 = -5;
    pub const NETWORK_ERROR: i32 = -6;
    pub const LOCAL_EXCEPTION: i32 = -7;
    pub const NO_READY: i32 = -8;
    pub const TIME_OUT: i32 = -9;
    pub const UNAVAILABLE: i32 = -10;
    pub const PAUSE: i32 = -11;
    pub const DENY_ACCESS: i32 = -12;
    pub const REMOTE_EMPTY: i32 = -13;
}

/// Client-facing result taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientResultKind {
    Ok,
    NoReady,
    NetworkError,
    LocalException,
    /// A lifecycle marker surfaced as an error carrying the status name.
    Informational(&'static str),
    InnerError,
    Unavailable,
    NotFound,
    ArgumentError,
    TimeOut,
    LogicalError,
    Pause,
    DenyAccess,
    RemoteEmpty,
}

impl ClientResultKind {
    pub fn is_success(self) -> bool {
        matches!(self, ClientResultKind::Ok)
    }

    pub fn code(self) -> i32 {
        match self {
            ClientResultKind::Ok | ClientResultKind::Informational(_) => error_code::SUCCESS,
            ClientResultKind::NoReady => error_code::NO_READY,
            ClientResultKind::NetworkError => error_code::NETWORK_ERROR,
            ClientResultKind::LocalException => error_code::LOCAL_EXCEPTION,
            ClientResultKind::InnerError => error_code::INNER_ERROR,
            ClientResultKind::Unavailable => error_code::UNAVAILABLE,
            ClientResultKind::NotFound => error_code::NOT_FIND,
            ClientResultKind::ArgumentError => error_code::ARGUMENT_ERROR,
            ClientResultKind::TimeOut => error_code::TIME_OUT,
            ClientResultKind::LogicalError => error_code::LOGICAL_ERROR,
            ClientResultKind::Pause => error_code::PAUSE,
            ClientResultKind::DenyAccess => error_code::DENY_ACCESS,
            ClientResultKind::RemoteEmpty => error_code::REMOTE_EMPTY,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ClientResultKind::Ok => "Success",
            ClientResultKind::Informational(text) => text,
            ClientResultKind::NoReady => "Service not ready",
            ClientResultKind::NetworkError => "Network error",
            ClientResultKind::LocalException => "Local exception",
            ClientResultKind::InnerError => "Internal server error",
            ClientResultKind::Unavailable => "Service unavailable",
            ClientResultKind::NotFound => "Service not found",
            ClientResultKind::ArgumentError => "Invalid argument",
            ClientResultKind::TimeOut => "Request timed out",
            ClientResultKind::LogicalError => "Logical error",
            ClientResultKind::Pause => "Service paused",
            ClientResultKind::DenyAccess => "Access denied",
            ClientResultKind::RemoteEmpty => "Empty remote response",
        }
    }

    /// Builds the serializable result for this kind.
    pub fn to_api_result(self) -> ApiResult {
        ApiResult {
            success: self.is_success(),
            status: ApiStatus {
                code: self.code(),
                message: self.message().to_string(),
                point: None,
            },
        }
    }
}

/// Serializable status block of an [`ApiResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    pub code: i32,
    #[serde(rename = "msg")]
    pub message: String,
    /// Name of the node that answered, when the interaction reached one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub point: Option<String>,
}

/// Caller-visible result of an RPC call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult {
    pub success: bool,
    pub status: ApiStatus,
}

impl ApiResult {
    pub fn with_point(mut self, point: impl Into<String>) -> Self {
        self.status.point = Some(point.into());
        self
    }

    /// Serializes to the JSON text placed into a call's result slot.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

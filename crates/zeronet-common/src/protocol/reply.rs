//! Reply messages: what a station or the center sends back for a request.
//!
//! A reply is a single multipart message whose description frame carries the
//! [`RemoteStatus`] in place of the command verb:
//!
//! ```text
//! [frame_count, status, tag_1, ..., tag_n, End] payload_1 ... payload_n
//! ```
//!
//! RPC calls receive two replies: an acknowledgement with no tags and status
//! `Running`, then the result reply.

use bytes::Bytes;

use crate::protocol::error::{Result, ZeroError};
use crate::protocol::frame::{parse_description, FrameType};
use crate::protocol::status::RemoteStatus;

/// Which payload a result reply carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultKind {
    #[default]
    None,
    Text,
    Binary,
}

/// Decoded reply, or a locally synthesized outcome of one interaction.
///
/// `interactive_success` is true when the message exchange itself worked
/// (sent, or received and decoded). `state` is then the remote status; when
/// it is false `state` holds the local failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroResult {
    pub state: RemoteStatus,
    pub interactive_success: bool,
    pub result_kind: ResultKind,
    pub result: Option<String>,
    pub binary: Option<Bytes>,
    /// Every frame of the reply in wire order, including result frames.
    pub values: Vec<(FrameType, Bytes)>,
}

impl ZeroResult {
    /// Outcome of a successful send.
    pub fn sent() -> Self {
        Self {
            state: RemoteStatus::Ok,
            interactive_success: true,
            result_kind: ResultKind::None,
            result: None,
            binary: None,
            values: Vec::new(),
        }
    }

    /// A failure that happened on this side of the wire.
    pub fn local(state: RemoteStatus) -> Self {
        Self {
            state,
            interactive_success: false,
            ..Self::sent()
        }
    }

    /// Decodes a reply.
    ///
    /// # Errors
    ///
    /// - [`ZeroError::FrameCountMismatch`] if the frame count differs from the
    ///   description
    /// - [`ZeroError::InvalidFrame`] for a missing or malformed description
    /// - [`ZeroError::UnknownStatus`] for an unknown status byte
    pub fn unpack(frames: &[Bytes]) -> Result<Self> {
        let (description, body) = frames
            .split_first()
            .ok_or_else(|| ZeroError::InvalidFrame("empty reply".to_string()))?;
        let tags = parse_description(description, body.len())?;
        let state = RemoteStatus::try_from(description[1])?;

        let mut reply = Self {
            state,
            ..Self::sent()
        };
        for (tag, payload) in tags.into_iter().zip(body.iter()) {
            let tag = FrameType::from_u8(tag)
                .ok_or_else(|| ZeroError::InvalidFrame(format!("unknown tag {:#04x}", tag)))?;
            match tag {
                FrameType::ResultText => {
                    reply.result = Some(String::from_utf8_lossy(payload).into_owned());
                    reply.result_kind = ResultKind::Text;
                }
                FrameType::BinaryContent => {
                    reply.binary = Some(payload.clone());
                    reply.result_kind = ResultKind::Binary;
                }
                _ => {}
            }
            reply.values.push((tag, payload.clone()));
        }
        Ok(reply)
    }

    /// Decodes a reply, folding decode failures into a local outcome:
    /// a frame-count mismatch becomes `FrameInvalid`, anything else
    /// `LocalException`.
    pub fn from_frames(frames: &[Bytes]) -> Self {
        match Self::unpack(frames) {
            Ok(reply) => reply,
            Err(ZeroError::FrameCountMismatch { declared, actual }) => {
                tracing::warn!(declared, actual, "reply frame count mismatch");
                Self::local(RemoteStatus::FrameInvalid)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode reply");
                Self::local(RemoteStatus::LocalException)
            }
        }
    }

    /// Returns the first frame with the given tag as a string.
    pub fn try_get_string(&self, tag: FrameType) -> Option<String> {
        self.values
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
    }
}

/// Builder for reply messages, used by the center and by station fakes.
#[derive(Debug, Clone)]
pub struct ReplyMessage {
    status: RemoteStatus,
    tags: Vec<FrameType>,
    payloads: Vec<Bytes>,
}

impl ReplyMessage {
    pub fn new(status: RemoteStatus) -> Self {
        Self {
            status,
            tags: Vec::new(),
            payloads: Vec::new(),
        }
    }

    /// The first-phase acknowledgement.
    pub fn ack() -> Self {
        Self::new(RemoteStatus::Running)
    }

    pub fn frame(mut self, tag: FrameType, payload: impl Into<Bytes>) -> Self {
        self.tags.push(tag);
        self.payloads.push(payload.into());
        self
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        let mut description = Vec::with_capacity(self.tags.len() + 3);
        description.push(self.tags.len() as u8);
        description.push(self.status.as_u8());
        description.extend(self.tags.iter().map(|t| t.as_u8()));
        description.push(FrameType::End.as_u8());

        let mut frames = Vec::with_capacity(self.payloads.len() + 1);
        frames.push(Bytes::from(description));
        frames.extend(self.payloads);
        frames
    }
}

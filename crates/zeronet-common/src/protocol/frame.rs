//! ZeroNet frame vocabulary and request description builder.
//!
//! A ZeroNet message is a multipart sequence of frames. Frame 0 is the
//! *description frame*:
//!
//! ```text
//! [frame_count, verb, tag_1, ..., tag_n, End]
//! ```
//!
//! `frame_count` is the number of declared tags (`n`). Requests always
//! declare a trailing [`FrameType::ServiceKey`] tag; the matching frame is
//! appended by [`WireMessage::into_frames`] from the sender's
//! [`ServiceKey`]. A plain call declares eight payload tags plus the service
//! key and so has a 12-byte description.

use bytes::Bytes;

use crate::auth::ServiceKey;
use crate::protocol::error::{Result, ZeroError};

/// Frame-type tags declared in description frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    End = 0x00,
    Command = b'$',
    Argument = b'%',
    TextContent = b'T',
    ExtendText = b'X',
    RequestId = b'I',
    Requester = b'R',
    Responser = b'E',
    CallId = b'G',
    Context = b'C',
    Plan = b'P',
    ServiceKey = b'&',
    BinaryContent = b'B',
    ResultText = b'r',
    Status = b'S',
    Publisher = b'U',
    SubTitle = b's',
    Title = b't',
}

impl FrameType {
    /// All known tags.
    pub const ALL: [FrameType; 18] = [
        FrameType::End,
        FrameType::Command,
        FrameType::Argument,
        FrameType::TextContent,
        FrameType::ExtendText,
        FrameType::RequestId,
        FrameType::Requester,
        FrameType::Responser,
        FrameType::CallId,
        FrameType::Context,
        FrameType::Plan,
        FrameType::ServiceKey,
        FrameType::BinaryContent,
        FrameType::ResultText,
        FrameType::Status,
        FrameType::Publisher,
        FrameType::SubTitle,
        FrameType::Title,
    ];

    /// Creates a tag from its wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|tag| *tag as u8 == value)
    }

    /// Returns the wire byte of this tag.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Command verb carried in byte 1 of a request description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ByteCommand {
    General = 0x01,
    Plan = 0x02,
    Ping = 0x10,
    HeartJoin = 0x20,
    HeartReady = 0x21,
    HeartPitpat = 0x22,
    HeartLeft = 0x23,
}

impl ByteCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::General),
            0x02 => Some(Self::Plan),
            0x10 => Some(Self::Ping),
            0x20 => Some(Self::HeartJoin),
            0x21 => Some(Self::HeartReady),
            0x22 => Some(Self::HeartPitpat),
            0x23 => Some(Self::HeartLeft),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Largest number of tags a description frame can declare.
pub const MAX_DECLARED_FRAMES: usize = u8::MAX as usize;

/// An outgoing request: verb plus `(tag, payload)` pairs in wire order.
///
/// This is the single parameterized builder behind plain calls, file-attached
/// calls, plan submissions and management commands.
///
/// # Example
///
/// ```
/// use zeronet_common::auth::ServiceKey;
/// use zeronet_common::protocol::frame::{ByteCommand, FrameType, WireMessage};
///
/// let message = WireMessage::new(ByteCommand::General)
///     .frame(FrameType::Command, "ping")
///     .frame(FrameType::Argument, "{}");
///
/// assert_eq!(message.description().unwrap(), vec![3, 0x01, b'$', b'%', b'&', 0]);
///
/// let frames = message.into_frames(&ServiceKey::new("key")).unwrap();
/// assert_eq!(frames.len(), 4);
/// assert_eq!(&frames[3][..], b"key");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    verb: u8,
    tags: Vec<FrameType>,
    payloads: Vec<Bytes>,
}

impl WireMessage {
    /// Creates an empty message for the given verb.
    pub fn new(verb: ByteCommand) -> Self {
        Self {
            verb: verb.as_u8(),
            tags: Vec::new(),
            payloads: Vec::new(),
        }
    }

    /// Appends a payload frame (builder style).
    pub fn frame(mut self, tag: FrameType, payload: impl Into<Bytes>) -> Self {
        self.push(tag, payload);
        self
    }

    /// Appends a payload frame.
    pub fn push(&mut self, tag: FrameType, payload: impl Into<Bytes>) {
        self.tags.push(tag);
        self.payloads.push(payload.into());
    }

    /// Returns the verb byte.
    pub fn verb(&self) -> u8 {
        self.verb
    }

    /// Returns the payload tags in wire order (without the service key).
    pub fn tags(&self) -> &[FrameType] {
        &self.tags
    }

    /// Returns the payload frames in wire order (without the service key).
    pub fn payloads(&self) -> &[Bytes] {
        &self.payloads
    }

    /// Number of frames declared in byte 0 (payloads plus the service key).
    pub fn declared_frame_count(&self) -> usize {
        self.tags.len() + 1
    }

    /// Builds the description frame.
    ///
    /// # Errors
    ///
    /// Returns [`ZeroError::InvalidFrame`] if more than
    /// [`MAX_DECLARED_FRAMES`] frames would be declared.
    pub fn description(&self) -> Result<Vec<u8>> {
        let count = self.declared_frame_count();
        if count > MAX_DECLARED_FRAMES {
            return Err(ZeroError::InvalidFrame(format!(
                "{} frames declared (max {})",
                count, MAX_DECLARED_FRAMES
            )));
        }

        let mut description = Vec::with_capacity(count + 3);
        description.push(count as u8);
        description.push(self.verb);
        description.extend(self.tags.iter().map(|tag| tag.as_u8()));
        description.push(FrameType::ServiceKey.as_u8());
        description.push(FrameType::End.as_u8());
        Ok(description)
    }

    /// Consumes the message and produces the frames to put on the wire:
    /// description, payloads, then the service-key frame.
    pub fn into_frames(self, service_key: &ServiceKey) -> Result<Vec<Bytes>> {
        let description = self.description()?;
        let mut frames = Vec::with_capacity(self.payloads.len() + 2);
        frames.push(Bytes::from(description));
        frames.extend(self.payloads);
        frames.push(service_key.frame());
        Ok(frames)
    }
}

/// A request decoded on the receiving side (center or worker station).
///
/// The trailing service-key frame is split off and returned separately so
/// the receiver can validate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    pub verb: u8,
    pub frames: Vec<(FrameType, Bytes)>,
    pub service_key: Option<Bytes>,
}

impl ReceivedRequest {
    /// Decodes request frames produced by [`WireMessage::into_frames`].
    pub fn unpack(frames: &[Bytes]) -> Result<Self> {
        let (description, body) = frames
            .split_first()
            .ok_or_else(|| ZeroError::InvalidFrame("empty message".to_string()))?;
        let tags = parse_description(description, body.len())?;

        let mut decoded = Vec::with_capacity(tags.len());
        let mut service_key = None;
        for (tag, payload) in tags.into_iter().zip(body.iter()) {
            match FrameType::from_u8(tag) {
                Some(FrameType::ServiceKey) => service_key = Some(payload.clone()),
                Some(tag) => decoded.push((tag, payload.clone())),
                None => {
                    return Err(ZeroError::InvalidFrame(format!("unknown tag {:#04x}", tag)));
                }
            }
        }

        Ok(Self {
            verb: description[1],
            frames: decoded,
            service_key,
        })
    }

    /// Returns the first frame with the given tag as a string.
    pub fn get_string(&self, tag: FrameType) -> Option<String> {
        self.frames
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
    }

    /// Returns all frames with the given tag, in order.
    pub fn all(&self, tag: FrameType) -> impl Iterator<Item = &Bytes> {
        self.frames
            .iter()
            .filter(move |(t, _)| *t == tag)
            .map(|(_, payload)| payload)
    }
}

/// Validates a description frame against the number of frames that follow it
/// and returns the declared tag bytes.
///
/// Shared by request, reply and publish decoding.
pub(crate) fn parse_description(description: &[u8], following: usize) -> Result<Vec<u8>> {
    if description.len() < 3 {
        return Err(ZeroError::InvalidFrame(format!(
            "description too short: {} bytes",
            description.len()
        )));
    }

    let declared = description[0] as usize;
    let tags = &description[2..];
    let end = tags
        .iter()
        .position(|tag| *tag == FrameType::End.as_u8())
        .ok_or_else(|| ZeroError::InvalidFrame("description has no end tag".to_string()))?;
    let tags = &tags[..end];

    if tags.len() != declared {
        return Err(ZeroError::InvalidFrame(format!(
            "description declares {} frames but lists {} tags",
            declared,
            tags.len()
        )));
    }
    if description.len() != declared + 3 {
        return Err(ZeroError::InvalidFrame(format!(
            "description has {} bytes after its end tag",
            description.len() - declared - 3
        )));
    }
    if following != declared {
        return Err(ZeroError::FrameCountMismatch {
            declared,
            actual: following,
        });
    }

    Ok(tags.to_vec())
}

/// Encodes an optional string the way every string frame is encoded:
/// UTF-8 bytes, empty frame for `None`.
pub fn string_frame(value: Option<&str>) -> Bytes {
    value
        .map(|v| Bytes::copy_from_slice(v.as_bytes()))
        .unwrap_or_default()
}

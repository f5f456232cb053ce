//! Broadcast (pub/sub) messages.
//!
//! ```text
//! frame 0: title (topic, used for prefix filtering)
//! frame 1: [frame_count, event_type, tag_1, ..., tag_n, End]
//! frame 2..: payloads in tag order
//! ```

use bytes::Bytes;

use crate::protocol::error::{Result, ZeroError};
use crate::protocol::frame::{parse_description, FrameType};

/// Event carried in byte 1 of a publish description.
///
/// The center broadcasts the `Center*` events on its monitor channel;
/// business publishers use [`ZeroNetEventType::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ZeroNetEventType {
    None = 0x00,
    CenterSystemStart = 0x01,
    CenterSystemClosing = 0x02,
    CenterSystemStop = 0x03,
    CenterWorkerSoundOff = 0x04,
    CenterStationState = 0x05,
    CenterStationJoin = 0x10,
    CenterStationLeft = 0x11,
    CenterStationPause = 0x12,
    CenterStationResume = 0x13,
    CenterStationClosing = 0x14,
    CenterStationInstall = 0x15,
    CenterStationUpdate = 0x16,
    CenterStationRemove = 0x17,
    CenterStationStop = 0x18,
    CenterConfigUpdate = 0x20,
}

impl ZeroNetEventType {
    pub const ALL: [ZeroNetEventType; 16] = [
        ZeroNetEventType::None,
        ZeroNetEventType::CenterSystemStart,
        ZeroNetEventType::CenterSystemClosing,
        ZeroNetEventType::CenterSystemStop,
        ZeroNetEventType::CenterWorkerSoundOff,
        ZeroNetEventType::CenterStationState,
        ZeroNetEventType::CenterStationJoin,
        ZeroNetEventType::CenterStationLeft,
        ZeroNetEventType::CenterStationPause,
        ZeroNetEventType::CenterStationResume,
        ZeroNetEventType::CenterStationClosing,
        ZeroNetEventType::CenterStationInstall,
        ZeroNetEventType::CenterStationUpdate,
        ZeroNetEventType::CenterStationRemove,
        ZeroNetEventType::CenterStationStop,
        ZeroNetEventType::CenterConfigUpdate,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|event| *event as u8 == value)
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// High-frequency events that are not worth logging one by one.
    pub fn is_chatty(self) -> bool {
        matches!(
            self,
            ZeroNetEventType::CenterWorkerSoundOff | ZeroNetEventType::CenterStationState
        )
    }
}

/// A decoded broadcast message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishItem {
    pub title: String,
    pub event: ZeroNetEventType,
    /// Station the event refers to (`SubTitle` frame).
    pub sub_title: Option<String>,
    pub content: Option<String>,
    pub publisher: Option<String>,
    pub request_id: Option<String>,
    pub binary: Option<Bytes>,
    pub context: Option<String>,
}

impl PublishItem {
    pub fn new(title: impl Into<String>, event: ZeroNetEventType) -> Self {
        Self {
            title: title.into(),
            event,
            sub_title: None,
            content: None,
            publisher: None,
            request_id: None,
            binary: None,
            context: None,
        }
    }

    pub fn with_sub_title(mut self, sub_title: impl Into<String>) -> Self {
        self.sub_title = Some(sub_title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn with_binary(mut self, binary: impl Into<Bytes>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Decodes a broadcast message.
    ///
    /// Unknown tags are skipped; an unknown event byte or a description that
    /// does not match the frame count is an error.
    pub fn unpack(frames: &[Bytes]) -> Result<Self> {
        if frames.len() < 2 {
            return Err(ZeroError::InvalidFrame(format!(
                "publish message needs at least 2 frames, got {}",
                frames.len()
            )));
        }

        let title = String::from_utf8_lossy(&frames[0]).into_owned();
        let description = &frames[1];
        let body = &frames[2..];
        let tags = parse_description(description, body.len())?;
        let event = ZeroNetEventType::from_u8(description[1]).ok_or_else(|| {
            ZeroError::InvalidFrame(format!("unknown event type {:#04x}", description[1]))
        })?;

        let mut item = PublishItem::new(title, event);
        for (tag, payload) in tags.into_iter().zip(body.iter()) {
            let text = || Some(String::from_utf8_lossy(payload).into_owned());
            match FrameType::from_u8(tag) {
                Some(FrameType::SubTitle) => item.sub_title = text(),
                Some(FrameType::TextContent) => item.content = text(),
                Some(FrameType::Publisher) => item.publisher = text(),
                Some(FrameType::RequestId) => item.request_id = text(),
                Some(FrameType::Context) => item.context = text(),
                Some(FrameType::BinaryContent) => item.binary = Some(payload.clone()),
                _ => {}
            }
        }
        Ok(item)
    }

    /// Encodes the item; absent fields are not put on the wire.
    pub fn into_frames(self) -> Vec<Bytes> {
        let mut tags = Vec::new();
        let mut payloads = Vec::new();
        let mut push = |tag: FrameType, payload: Option<Bytes>| {
            if let Some(payload) = payload {
                tags.push(tag.as_u8());
                payloads.push(payload);
            }
        };
        push(FrameType::SubTitle, self.sub_title.map(Bytes::from));
        push(FrameType::TextContent, self.content.map(Bytes::from));
        push(FrameType::Publisher, self.publisher.map(Bytes::from));
        push(FrameType::RequestId, self.request_id.map(Bytes::from));
        push(FrameType::Context, self.context.map(Bytes::from));
        push(FrameType::BinaryContent, self.binary);

        let mut description = Vec::with_capacity(tags.len() + 3);
        description.push(tags.len() as u8);
        description.push(self.event.as_u8());
        description.extend(tags);
        description.push(FrameType::End.as_u8());

        let mut frames = Vec::with_capacity(payloads.len() + 2);
        frames.push(Bytes::from(self.title));
        frames.push(Bytes::from(description));
        frames.extend(payloads);
        frames
    }
}

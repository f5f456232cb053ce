use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::error::ZeroError;

/// Maximum size of one multipart message on the wire (100 MB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Maximum number of frames in one multipart message.
pub const MAX_FRAMES: usize = 1024;

/// Length-prefixed multipart framing.
///
/// # Wire Format
///
/// ```text
/// [u32 BE frame count] ([u32 BE frame length] [frame bytes])*
/// ```
///
/// The decoder only consumes input once a whole message is buffered, so a
/// read interrupted by a poll timeout never loses a partial message.
///
/// # Example
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use tokio_util::codec::{Decoder, Encoder};
/// use zeronet_common::transport::MultipartCodec;
///
/// let mut codec = MultipartCodec::new();
/// let mut buf = BytesMut::new();
/// codec
///     .encode(vec![Bytes::from_static(b"a"), Bytes::from_static(b"bc")], &mut buf)
///     .unwrap();
///
/// let frames = codec.decode(&mut buf).unwrap().unwrap();
/// assert_eq!(frames.len(), 2);
/// assert!(buf.is_empty());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MultipartCodec {
    max_message_size: usize,
}

impl MultipartCodec {
    pub fn new() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Creates a codec with a custom message size limit.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Returns the total encoded size of a buffered message, or `None` if
    /// more input is needed.
    fn buffered_message_len(&self, src: &[u8]) -> Result<Option<usize>, ZeroError> {
        if src.len() < 4 {
            return Ok(None);
        }
        let count = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if count > MAX_FRAMES {
            return Err(ZeroError::InvalidFrame(format!(
                "{} frames in one message (max {})",
                count, MAX_FRAMES
            )));
        }

        let mut offset = 4;
        for _ in 0..count {
            if src.len() < offset + 4 {
                return Ok(None);
            }
            let len = u32::from_be_bytes([
                src[offset],
                src[offset + 1],
                src[offset + 2],
                src[offset + 3],
            ]) as usize;
            offset += 4;

            let total = offset + len;
            if total > self.max_message_size {
                return Err(ZeroError::MessageTooLarge {
                    size: total,
                    max: self.max_message_size,
                });
            }
            if src.len() < total {
                return Ok(None);
            }
            offset = total;
        }
        Ok(Some(offset))
    }
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MultipartCodec {
    type Item = Vec<Bytes>;
    type Error = ZeroError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let total = match self.buffered_message_len(src)? {
            Some(total) => total,
            None => return Ok(None),
        };

        let mut message = src.split_to(total);
        let count = message.get_u32() as usize;
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            let len = message.get_u32() as usize;
            frames.push(message.split_to(len).freeze());
        }
        Ok(Some(frames))
    }
}

impl Encoder<Vec<Bytes>> for MultipartCodec {
    type Error = ZeroError;

    fn encode(&mut self, frames: Vec<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if frames.len() > MAX_FRAMES {
            return Err(ZeroError::InvalidFrame(format!(
                "{} frames in one message (max {})",
                frames.len(),
                MAX_FRAMES
            )));
        }
        let size = 4 + frames.iter().map(|f| 4 + f.len()).sum::<usize>();
        if size > self.max_message_size {
            return Err(ZeroError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }

        dst.reserve(size);
        dst.put_u32(frames.len() as u32);
        for frame in frames {
            dst.put_u32(frame.len() as u32);
            dst.put_slice(&frame);
        }
        Ok(())
    }
}

//! ZeroNet Transport Layer
//!
//! Multipart message transport over TCP.
//!
//! # Architecture
//!
//! - **Framing**: every message is a list of frames, written as
//!   `[u32 BE frame count]` followed by `[u32 BE length][bytes]` per frame
//! - **Request sockets**: [`FrameTransport`], a connected bidirectional
//!   channel, opened by a [`Connector`]
//! - **Broadcast**: [`Publisher`] and [`Subscriber`], with topic-prefix
//!   filtering done on the publishing side
//!
//! # Message Size Limits
//!
//! All transports enforce a maximum message size of 100 MB to prevent memory
//! exhaustion attacks.

pub mod codec;
pub mod pubsub;
pub mod tcp;

pub use codec::{MultipartCodec, MAX_MESSAGE_SIZE};
pub use pubsub::{Publisher, Subscriber, TcpSubscriber};
pub use tcp::{Connector, FrameListener, FrameTransport, TcpConnector, TcpFrameTransport};

#[cfg(test)]
mod tests;

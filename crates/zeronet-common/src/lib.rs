//! ZeroNet Common Types and Transport
//!
//! This crate provides the wire protocol and the multipart TCP transport
//! shared by every ZeroNet station process.
//!
//! # Overview
//!
//! ZeroNet stations register with a central coordinator (the Zero Center),
//! exchange framed request/reply calls, and listen to the center's broadcast
//! channel. This crate contains the pieces all of them agree on:
//!
//! - **Protocol Layer**: frame vocabulary, request description builder,
//!   reply and publish decoding, the remote status taxonomy and its mapping
//!   onto client-visible results
//! - **Transport Layer**: multipart messages over TCP, with request sockets
//!   and a prefix-filtered broadcast channel
//!
//! # Architecture
//!
//! - **Message**: a list of frames; frame 0 describes the frames that follow
//! - **Framing**: `[u32 BE frame count]` then `[u32 BE length][bytes]` per frame
//! - **Max Message Size**: 100 MB (prevents memory exhaustion)
//! - **Authentication**: every request ends with the sender's service key
//!
//! # Example
//!
//! ```
//! use zeronet_common::auth::ServiceKey;
//! use zeronet_common::protocol::{CallRequest, ReplyMessage, RemoteStatus, ZeroResult};
//!
//! let frames = CallRequest::new("v1/user/login", "{}")
//!     .to_message()
//!     .and_then(|m| m.into_frames(&ServiceKey::default()))
//!     .unwrap();
//! assert_eq!(frames[0].len(), 12);
//!
//! let ack = ZeroResult::from_frames(&ReplyMessage::ack().into_frames());
//! assert_eq!(ack.state, RemoteStatus::Running);
//! ```

pub mod auth;
pub mod protocol;
pub mod transport;

pub use protocol::*;

//! Alice Blue Feed Adapters
//!
//! Everything that knows the venue's wire formats:
//!
//! - **Decoding**: JSON delta frames ([`json`]) and fixed-width binary
//!   records ([`binary`]) behind one [`FrameDecoder`] interface
//! - **Requests**: handshake, subscriptions and heartbeats ([`messages`])
//! - **Protocol**: decoder plus request encoding per feed ([`protocol`])
//! - **Connection**: heartbeat, reconnect policy and the connection
//!   manager ([`client`])

pub mod binary;
pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod json;
pub mod messages;
pub mod protocol;
pub mod reconnect;

pub use binary::BinaryDecoder;
pub use client::{FeedClient, FeedClientConfig, FeedClientError};
pub use codec::{CodecError, DecodedFrame, FrameDecoder, RawFrame};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use json::JsonDecoder;
pub use protocol::{FeedProtocol, ProtocolError, ProtocolKind};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};

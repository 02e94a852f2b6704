//! Wire protocol types for DeskFriends relay communication.
//!
//! The relay speaks two interchangeable wire formats over WebSocket text
//! frames: the framed (named event channel) format and the raw JSON
//! envelope format. This crate defines the shared event vocabulary, the
//! payload types, and the codec for both formats.

pub mod codec;
pub mod events;
pub mod types;

pub use codec::{CodecError, WireFormat, decode, encode};
pub use events::{Event, EventKind};
pub use types::{
    ActionKind, MessageKind, PeerAction, PeerInfo, PeerMessage, RegisterRequest, ServerInfo,
    now_millis,
};

/// Identity string a relay must report from `GET /info` to be recognized.
pub const SERVER_IDENTITY: &str = "DesktopFriends Server";

//! Voice-assistant bridge for DeskFriends.
//!
//! A session state machine independent of the peer-messaging relay:
//! OTA activation, the hello handshake, streamed audio in both
//! directions, and strictly sequential playback.

pub mod bridge;
pub mod decode;
pub mod ota;
pub mod playback;
pub mod session;
pub mod types;

pub use bridge::{AudioBridge, ConnectOutcome};
pub use decode::{DecodeChain, PcmChunk, PcmSink, RawPcmDecoder, VoiceDecoder, WavDecoder};
pub use ota::OtaOutcome;
pub use playback::{PlaybackHandle, PlaybackQueue};
pub use session::{BridgeSession, ControlCallback};
pub use types::{BridgeState, DeviceIdentity, generate_device_mac};

use std::time::Duration;

/// Errors surfaced by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no hello from server within {0:?}")]
    HelloTimeout(Duration),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("session closed")]
    Closed,
}

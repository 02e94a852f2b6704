//! Encoders/decoders for the two relay wire formats.
//!
//! The framed format names each event as a channel and ships
//! `["<event>", <data>]` JSON arrays. The raw format wraps the same
//! payloads in `{"event": "<event>", "data": <data>}` objects. Everything
//! above the transport works in terms of [`Event`] and never sees which
//! format is active.

use serde::{Deserialize, Serialize};

use crate::events::{Event, EventKind, OfflinePayload};

/// Which wire representation a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    Framed,
    Raw,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::Framed => f.write_str("framed"),
            WireFormat::Raw => f.write_str("raw"),
        }
    }
}

/// Errors from encoding or decoding a wire frame.
///
/// Decode errors are expected in normal operation (a newer relay may ship
/// events this client does not know); callers log and drop them rather
/// than tearing the connection down.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown event {0:?}")]
    UnknownEvent(String),

    #[error("malformed frame: {0}")]
    Malformed(&'static str),
}

#[derive(Serialize)]
struct RawFrame {
    event: String,
    data: serde_json::Value,
}

/// Encodes an event into a single text frame in the given format.
pub fn encode(format: WireFormat, event: &Event) -> Result<String, CodecError> {
    let name = event.kind().as_str();
    let data = event.payload_json()?;
    let text = match format {
        WireFormat::Framed => serde_json::to_string(&(name, data))?,
        WireFormat::Raw => serde_json::to_string(&RawFrame {
            event: name.to_string(),
            data,
        })?,
    };
    Ok(text)
}

/// Decodes a single text frame in the given format.
pub fn decode(format: WireFormat, text: &str) -> Result<Event, CodecError> {
    let (name, data) = match format {
        WireFormat::Framed => {
            let frame: Vec<serde_json::Value> = serde_json::from_str(text)?;
            let mut parts = frame.into_iter();
            let name = match parts.next() {
                Some(serde_json::Value::String(s)) => s,
                _ => return Err(CodecError::Malformed("framed frame missing event name")),
            };
            let data = parts.next().unwrap_or(serde_json::Value::Null);
            (name, data)
        }
        WireFormat::Raw => {
            // Parsed by hand rather than into a struct: serde would also
            // accept a two-element array for a two-field struct, and raw
            // frames must be objects.
            let value: serde_json::Value = serde_json::from_str(text)?;
            let serde_json::Value::Object(mut frame) = value else {
                return Err(CodecError::Malformed("raw frame is not an object"));
            };
            let name = match frame.remove("event") {
                Some(serde_json::Value::String(s)) => s,
                _ => return Err(CodecError::Malformed("raw frame missing event name")),
            };
            let data = frame.remove("data").unwrap_or(serde_json::Value::Null);
            (name, data)
        }
    };

    let kind = EventKind::from_name(&name).ok_or(CodecError::UnknownEvent(name))?;
    let event = match kind {
        EventKind::Register => Event::Register(serde_json::from_value(data)?),
        EventKind::Message => Event::Message(serde_json::from_value(data)?),
        EventKind::Action => Event::Action(serde_json::from_value(data)?),
        EventKind::RosterList => Event::RosterList(serde_json::from_value(data)?),
        EventKind::PeerOnline => Event::PeerOnline(serde_json::from_value(data)?),
        EventKind::PeerOffline => {
            let payload: OfflinePayload = serde_json::from_value(data)?;
            Event::PeerOffline(payload.into_id())
        }
    };
    Ok(event)
}

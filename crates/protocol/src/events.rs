use serde::{Deserialize, Serialize};

use crate::types::{PeerAction, PeerInfo, PeerMessage, RegisterRequest};

/// Wire names of every event in the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Client → server: announce this pet and its model.
    Register,
    /// Both directions: a chat message.
    Message,
    /// Both directions: an avatar action broadcast.
    Action,
    /// Server → client: full roster snapshot, unicast after registration.
    RosterList,
    /// Server → client: a pet came online.
    PeerOnline,
    /// Server → client: a pet went offline.
    PeerOffline,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Register => "pet:register",
            EventKind::Message => "pet:message",
            EventKind::Action => "pet:action",
            EventKind::RosterList => "pets:list",
            EventKind::PeerOnline => "pet:online",
            EventKind::PeerOffline => "pet:offline",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pet:register" => Some(EventKind::Register),
            "pet:message" => Some(EventKind::Message),
            "pet:action" => Some(EventKind::Action),
            "pets:list" => Some(EventKind::RosterList),
            "pet:online" => Some(EventKind::PeerOnline),
            "pet:offline" => Some(EventKind::PeerOffline),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed application event, independent of which wire format carried it.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Register(RegisterRequest),
    Message(PeerMessage),
    Action(PeerAction),
    RosterList(Vec<PeerInfo>),
    PeerOnline(PeerInfo),
    PeerOffline(String),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Register(_) => EventKind::Register,
            Event::Message(_) => EventKind::Message,
            Event::Action(_) => EventKind::Action,
            Event::RosterList(_) => EventKind::RosterList,
            Event::PeerOnline(_) => EventKind::PeerOnline,
            Event::PeerOffline(_) => EventKind::PeerOffline,
        }
    }

    /// Serializes just the payload half of the event.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Event::Register(p) => serde_json::to_value(p),
            Event::Message(p) => serde_json::to_value(p),
            Event::Action(p) => serde_json::to_value(p),
            Event::RosterList(p) => serde_json::to_value(p),
            Event::PeerOnline(p) => serde_json::to_value(p),
            Event::PeerOffline(id) => serde_json::to_value(id),
        }
    }
}

/// Offline payloads arrive either as a bare id string or as `{"id": ...}`
/// depending on relay version. Accept both.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub(crate) enum OfflinePayload {
    Bare(String),
    Wrapped { id: String },
}

impl OfflinePayload {
    pub(crate) fn into_id(self) -> String {
        match self {
            OfflinePayload::Bare(id) => id,
            OfflinePayload::Wrapped { id } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_round_trip() {
        for kind in [
            EventKind::Register,
            EventKind::Message,
            EventKind::Action,
            EventKind::RosterList,
            EventKind::PeerOnline,
            EventKind::PeerOffline,
        ] {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_event_name_rejected() {
        assert_eq!(EventKind::from_name("pet:unknown"), None);
        assert_eq!(EventKind::from_name(""), None);
    }

    #[test]
    fn offline_payload_both_shapes() {
        let bare: OfflinePayload = serde_json::from_str("\"p1\"").unwrap();
        assert_eq!(bare.into_id(), "p1");

        let wrapped: OfflinePayload = serde_json::from_str(r#"{"id":"p2"}"#).unwrap();
        assert_eq!(wrapped.into_id(), "p2");
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A pet visible on the relay roster.
///
/// The `id` is session-scoped: the relay hands out a fresh one every time a
/// pet registers, so consumers must not treat it as a stable identity
/// across reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_path: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub joined_at: i64,
}

/// Who a chat message is framed as coming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    MasterToPet,
    PetToPet,
}

/// A chat message relayed between pets.
///
/// `is_direct_target` is computed locally per recipient; the relay forwards
/// whatever the sender put there, so receivers must recompute it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessage {
    pub from_id: String,
    pub from: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_name: Option<String>,
    pub message_type: MessageKind,
    #[serde(default)]
    pub is_direct_target: bool,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

/// Avatar control verbs a pet can broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Motion,
    Expression,
}

/// A broadcast avatar action (play a motion or set an expression).
///
/// Transient: dispatched to the live action callback, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAction {
    pub pet_id: String,
    pub pet_name: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub name: String,
}

/// Registration payload sent right after the transport opens.
///
/// The client supplies its own session id so that roster entries and
/// `to`-addressing use the same identifier on both wire formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_path: String,
}

/// Response body of the relay's `GET /info` probe endpoint.
///
/// Presence of `ws_port` means the relay also speaks the raw protocol on
/// that port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_port: Option<u16>,
    #[serde(default)]
    pub pets: u32,
}

/// Current time as epoch milliseconds, the timestamp unit used on the wire.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_info_wire_shape() {
        let peer = PeerInfo {
            id: "p1".into(),
            name: "Mochi".into(),
            model_path: "models/mochi.model3.json".into(),
            joined_at: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&peer).unwrap();
        assert_eq!(json["modelPath"], "models/mochi.model3.json");
        assert_eq!(json["joinedAt"], 1_700_000_000_000_i64);
    }

    #[test]
    fn message_kind_snake_case() {
        assert_eq!(
            serde_json::to_string(&MessageKind::MasterToPet).unwrap(),
            "\"master_to_pet\""
        );
        assert_eq!(
            serde_json::to_string(&MessageKind::PetToPet).unwrap(),
            "\"pet_to_pet\""
        );
    }

    #[test]
    fn peer_message_omits_missing_target() {
        let msg = PeerMessage {
            from_id: "a".into(),
            from: "A".into(),
            content: "hi".into(),
            to: None,
            to_name: None,
            message_type: MessageKind::PetToPet,
            is_direct_target: false,
            timestamp: 0,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("\"to\""));
        assert!(!json.contains("toName"));
    }

    #[test]
    fn peer_action_type_field() {
        let action = PeerAction {
            pet_id: "p1".into(),
            pet_name: "Mochi".into(),
            kind: ActionKind::Motion,
            name: "wave".into(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "motion");
        assert_eq!(json["petName"], "Mochi");
    }

    #[test]
    fn server_info_ws_port_optional() {
        let info: ServerInfo = serde_json::from_str(
            r#"{"name":"DesktopFriends Server","ip":"192.168.1.50","port":3000,"pets":2}"#,
        )
        .unwrap();
        assert_eq!(info.ws_port, None);
        assert_eq!(info.pets, 2);

        let info: ServerInfo = serde_json::from_str(
            r#"{"name":"DesktopFriends Server","ip":"192.168.1.50","port":3000,"wsPort":3100,"pets":0}"#,
        )
        .unwrap();
        assert_eq!(info.ws_port, Some(3100));
    }

    #[test]
    fn register_request_id_optional_on_wire() {
        let req = RegisterRequest {
            id: None,
            name: "Mochi".into(),
            model_path: String::new(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("modelPath"));
    }
}

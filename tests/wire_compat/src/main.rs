fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use deskfriends_protocol::{Event, WireFormat, decode, encode};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// The reference client serializes timestamps as plain integers while a
    /// float-typed reserialization may render `65` as `65.0`. Both are
    /// semantically identical, so numbers are compared as f64.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    serde_json::json!(f)
                } else {
                    v.clone()
                }
            }
            serde_json::Value::Object(map) => {
                let normalized: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect();
                serde_json::Value::Object(normalized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        let norm_fixture = normalize_value(&fixture);
        let norm_reserialized = normalize_value(&reserialized);
        assert_eq!(
            norm_fixture, norm_reserialized,
            "roundtrip mismatch for {name}:\n  reference: {fixture}\n  rust:      {reserialized}"
        );
    }

    /// Decodes a whole captured frame, re-encodes it with the same wire
    /// format, and compares the frames as JSON values.
    fn frame_roundtrip_test(name: &str, format: WireFormat) -> Event {
        let fixture = load_fixture(name);
        let text = serde_json::to_string(&fixture)
            .unwrap_or_else(|e| panic!("failed to render fixture {name}: {e}"));
        let event =
            decode(format, &text).unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));
        let re_encoded =
            encode(format, &event).unwrap_or_else(|e| panic!("failed to re-encode {name}: {e}"));
        let re_parsed: serde_json::Value = serde_json::from_str(&re_encoded)
            .unwrap_or_else(|e| panic!("re-encoded {name} is not JSON: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&re_parsed),
            "frame roundtrip mismatch for {name}:\n  reference: {fixture}\n  rust:      {re_parsed}"
        );
        event
    }

    // --- Payload type fixtures ---

    #[test]
    fn fixture_peer_info() {
        roundtrip_test::<deskfriends_protocol::PeerInfo>("peer_info.json");
    }

    #[test]
    fn fixture_peer_message_direct() {
        roundtrip_test::<deskfriends_protocol::PeerMessage>("peer_message_direct.json");
    }

    #[test]
    fn fixture_peer_message_broadcast() {
        roundtrip_test::<deskfriends_protocol::PeerMessage>("peer_message_broadcast.json");
    }

    #[test]
    fn fixture_peer_action() {
        roundtrip_test::<deskfriends_protocol::PeerAction>("peer_action.json");
    }

    #[test]
    fn fixture_register_request() {
        roundtrip_test::<deskfriends_protocol::RegisterRequest>("register_request.json");
    }

    #[test]
    fn fixture_server_info() {
        roundtrip_test::<deskfriends_protocol::ServerInfo>("server_info.json");
    }

    // --- Whole-frame fixtures, framed protocol ---

    #[test]
    fn fixture_framed_message_frame() {
        let event = frame_roundtrip_test("framed_message.json", WireFormat::Framed);
        let Event::Message(message) = event else {
            panic!("expected a message event");
        };
        assert_eq!(message.to.as_deref(), Some("pet-22b1"));
    }

    #[test]
    fn fixture_framed_roster_frame() {
        let event = frame_roundtrip_test("framed_roster.json", WireFormat::Framed);
        let Event::RosterList(peers) = event else {
            panic!("expected a roster event");
        };
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn fixture_framed_register_frame() {
        frame_roundtrip_test("framed_register.json", WireFormat::Framed);
    }

    // --- Whole-frame fixtures, raw protocol ---

    #[test]
    fn fixture_raw_online_frame() {
        let event = frame_roundtrip_test("raw_online.json", WireFormat::Raw);
        assert!(matches!(event, Event::PeerOnline(_)));
    }

    #[test]
    fn fixture_raw_offline_frame() {
        let event = frame_roundtrip_test("raw_offline.json", WireFormat::Raw);
        assert_eq!(event, Event::PeerOffline("pet-22b1".into()));
    }

    #[test]
    fn fixture_raw_action_frame() {
        frame_roundtrip_test("raw_action.json", WireFormat::Raw);
    }

    // --- Backward compatibility: shapes older relays still emit ---

    #[test]
    fn legacy_offline_with_wrapped_id() {
        // Older relays wrap the offline id in an object; re-encoding
        // normalizes to the bare string, so this is decode-only.
        let fixture = load_fixture("raw_offline_wrapped.json");
        let text = serde_json::to_string(&fixture).unwrap();
        let event = decode(WireFormat::Raw, &text).unwrap();
        assert_eq!(event, Event::PeerOffline("pet-22b1".into()));
    }

    #[test]
    fn legacy_server_info_without_ws_port() {
        let fixture = load_fixture("server_info_legacy.json");
        let info: deskfriends_protocol::ServerInfo = serde_json::from_value(fixture).unwrap();
        assert_eq!(info.ws_port, None, "missing wsPort should default to None");
        assert_eq!(info.name, "DesktopFriends Server");
    }

    #[test]
    fn legacy_message_without_direct_flag() {
        let json = r#"{
            "fromId": "pet-old",
            "from": "Old Pet",
            "content": "hello",
            "messageType": "pet_to_pet",
            "timestamp": 1716899125000
        }"#;
        let message: deskfriends_protocol::PeerMessage = serde_json::from_str(json).unwrap();
        assert!(
            !message.is_direct_target,
            "missing isDirectTarget should default to false"
        );
        assert!(message.to.is_none());
    }

    #[test]
    fn legacy_register_without_id() {
        let json = r#"{"name": "Old Pet", "modelPath": "models/old.model3.json"}"#;
        let request: deskfriends_protocol::RegisterRequest = serde_json::from_str(json).unwrap();
        assert!(request.id.is_none(), "missing id should default to None");
    }

    // --- Cross-format guards ---

    #[test]
    fn framed_frame_rejected_by_raw_decoder() {
        let fixture = load_fixture("framed_message.json");
        let text = serde_json::to_string(&fixture).unwrap();
        assert!(decode(WireFormat::Raw, &text).is_err());
    }

    #[test]
    fn raw_frame_rejected_by_framed_decoder() {
        let fixture = load_fixture("raw_online.json");
        let text = serde_json::to_string(&fixture).unwrap();
        assert!(decode(WireFormat::Framed, &text).is_err());
    }
}

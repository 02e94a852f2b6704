//! Public types for the voice-assistant bridge.

use serde::{Deserialize, Serialize};

/// Lifecycle of the bridge session.
///
/// `BindingRequired` is terminal until the user pairs the device on the
/// assistant side and a new connect attempt is made; the bridge never
/// retries it on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Disconnected,
    Connecting,
    Connected,
    BindingRequired { code: String },
}

/// Stable device identity presented to the assistant service.
///
/// The MAC is the primary key on the assistant side; persist it across
/// runs so the device keeps its binding. `generate()` mints a fresh one
/// for first launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Locally-administered MAC string, e.g. `"02:4f:9a:..."`.
    pub mac: String,
    /// Per-install client UUID.
    pub client_id: String,
    /// Human-readable device name shown in the assistant console.
    pub name: String,
}

impl DeviceIdentity {
    pub fn generate() -> Self {
        let name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "deskfriends".to_string());
        Self {
            mac: generate_device_mac(),
            client_id: uuid::Uuid::new_v4().to_string(),
            name,
        }
    }
}

/// Mints a random locally-administered, unicast MAC address string.
pub fn generate_device_mac() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let first = (bytes[0] | 0x02) & 0xFE;
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        first, bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_mac_is_locally_administered_unicast() {
        for _ in 0..32 {
            let mac = generate_device_mac();
            assert_eq!(mac.len(), 17);
            let first = u8::from_str_radix(&mac[0..2], 16).unwrap();
            assert_eq!(first & 0x02, 0x02, "locally administered bit");
            assert_eq!(first & 0x01, 0x00, "unicast bit");
        }
    }

    #[test]
    fn generated_identities_are_unique() {
        let a = DeviceIdentity::generate();
        let b = DeviceIdentity::generate();
        assert_ne!(a.mac, b.mac);
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn bridge_state_serializes_snake_case() {
        let json = serde_json::to_string(&BridgeState::BindingRequired {
            code: "123456".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"binding_required":{"code":"123456"}}"#);
    }
}

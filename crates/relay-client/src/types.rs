//! Public types for the relay client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use deskfriends_protocol::{MessageKind, PeerMessage, WireFormat};

/// Lifecycle of the single relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Snapshot of the connection. Exactly one relay connection exists per
/// process; every UI surface reads the same snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub is_registered: bool,
    /// Wire format selected by auto-detection; `None` while disconnected.
    pub protocol: Option<WireFormat>,
    /// Session-scoped id; reassigned on every successful connect.
    pub my_peer_id: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            is_registered: false,
            protocol: None,
            my_peer_id: None,
        }
    }
}

/// A chat message after routing: what the UI should display.
///
/// For direct targets `display` is the verbatim content; for bystanders it
/// is the synthesized third-person framing.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    pub from_id: String,
    pub from: String,
    pub display: String,
    pub message_type: MessageKind,
    pub is_direct_target: bool,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// The message as it arrived, before framing.
    pub raw: PeerMessage,
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StatusChanged(ConnectionStatus),
    Registered { my_peer_id: String },
    RosterReplaced(usize),
    PeerJoined(String),
    PeerLeft(String),
}

/// Capped exponential backoff for callers that retry `connect()`.
///
/// The manager itself never auto-reconnects; retry policy belongs to the
/// layer that owns user-facing toggles like auto-connect. This helper just
/// standardises the delay curve.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry `attempt` (1-based): grows by `backoff_factor`
    /// per attempt from `initial_delay`, clamps at `max_delay`, then
    /// spreads the result across ±25% so restarting clients don't hit the
    /// relay in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let step = attempt.saturating_sub(1).min(63) as i32;
        let base = (self.initial_delay.as_secs_f64() * self.backoff_factor.powi(step))
            .min(self.max_delay.as_secs_f64());
        // Sub-second wall-clock nanos stand in for an RNG here.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let spread = f64::from(nanos) / f64::from(u32::MAX) - 0.5;
        let jittered = base * (1.0 + 0.5 * spread);
        Duration::from_secs_f64(jittered.max(0.05))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_disconnected() {
        let state = ConnectionState::default();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(!state.is_registered);
        assert!(state.protocol.is_none());
        assert!(state.my_peer_id.is_none());
    }

    #[test]
    fn reconnect_delay_doubles_then_caps() {
        let config = ReconnectConfig::default();
        // Unjittered curve: 250ms doubling up to the 15s cap. The jitter
        // band is ±25%, so a ±30% window gives slack without letting a
        // wrong attempt's bucket sneak in.
        for (attempt, base) in [(1, 0.25), (2, 0.5), (3, 1.0), (5, 4.0), (7, 15.0), (20, 15.0)] {
            let secs = config.delay_for_attempt(attempt).as_secs_f64();
            assert!(
                (base * 0.7..=base * 1.3).contains(&secs),
                "attempt {attempt}: {secs:.3}s strays from {base}s"
            );
        }
    }
}

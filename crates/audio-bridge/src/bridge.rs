//! Bridge lifecycle: OTA activation followed by the voice session.

use std::sync::{Arc, RwLock as StdRwLock};

use tracing::{info, warn};

use crate::BridgeError;
use crate::decode::{PcmSink, VoiceDecoder};
use crate::ota::{OtaOutcome, fetch_ota};
use crate::session::BridgeSession;
use crate::types::{BridgeState, DeviceIdentity};

/// Result of a connect attempt that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// The device must be paired on the assistant side first. Terminal
    /// until `connect` is called again after pairing.
    BindingRequired { code: String },
}

/// Owns the bridge state machine and the one live session.
pub struct AudioBridge {
    http: reqwest::Client,
    identity: DeviceIdentity,
    state: Arc<StdRwLock<BridgeState>>,
    session: tokio::sync::Mutex<Option<BridgeSession>>,
}

impl AudioBridge {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            http: reqwest::Client::new(),
            identity,
            state: Arc::new(StdRwLock::new(BridgeState::Disconnected)),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> BridgeState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(BridgeState::Disconnected)
    }

    /// Runs the OTA handshake and, when the device is bound, opens the
    /// voice session. Re-entrant calls while connecting or connected are
    /// no-ops.
    ///
    /// The codec and sink are consumed per attempt; callers supply fresh
    /// stages on retry.
    pub async fn connect(
        &self,
        ota_endpoint: &str,
        codec: Option<Box<dyn VoiceDecoder>>,
        sink: Box<dyn PcmSink>,
    ) -> Result<ConnectOutcome, BridgeError> {
        let mut session_slot = self.session.lock().await;
        if matches!(
            self.state(),
            BridgeState::Connecting | BridgeState::Connected
        ) {
            return Ok(ConnectOutcome::Connected);
        }
        self.set_state(BridgeState::Connecting);

        let outcome = match fetch_ota(&self.http, ota_endpoint, &self.identity).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.set_state(BridgeState::Disconnected);
                return Err(e);
            }
        };

        let (ws_url, token) = match outcome {
            OtaOutcome::BindingRequired { code } => {
                self.set_state(BridgeState::BindingRequired { code: code.clone() });
                return Ok(ConnectOutcome::BindingRequired { code });
            }
            OtaOutcome::Ready { ws_url, token } => (ws_url, token),
        };

        let session = match BridgeSession::connect(
            &ws_url,
            token.as_deref(),
            &self.identity,
            codec,
            sink,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "voice session failed to open");
                self.set_state(BridgeState::Disconnected);
                return Err(e);
            }
        };

        let state = self.state.clone();
        session
            .set_disconnect_callback(Box::new(move || {
                if let Ok(mut s) = state.write() {
                    *s = BridgeState::Disconnected;
                }
            }))
            .await;

        self.set_state(BridgeState::Connected);
        info!(session = %session.session_id(), "audio bridge connected");
        *session_slot = Some(session);
        Ok(ConnectOutcome::Connected)
    }

    pub async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
        }
        self.set_state(BridgeState::Disconnected);
    }

    /// Runs `f` against the live session, or fails when there is none.
    pub async fn with_session<T>(
        &self,
        f: impl AsyncFnOnce(&BridgeSession) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let guard = self.session.lock().await;
        match guard.as_ref() {
            Some(session) => f(session).await,
            None => Err(BridgeError::Closed),
        }
    }

    fn set_state(&self, next: BridgeState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }
}

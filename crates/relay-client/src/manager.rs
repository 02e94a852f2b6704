//! Connection manager owning the single relay transport.
//!
//! Performs protocol auto-detection against the target URL, drives the
//! connect/disconnect lifecycle, and publishes connection state shared by
//! every consumer. Reconnection policy deliberately lives above this
//! layer: the manager never retries on its own, it only reports the
//! disconnect and leaves the retry cadence to whoever owns the
//! auto-connect toggle (see [`ReconnectConfig`](crate::types::ReconnectConfig)).

use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use deskfriends_protocol::{Event, ServerInfo, WireFormat};

use crate::roster::RosterStore;
use crate::transport::{EventCallback, RelayTransport, TransportError};
use crate::types::{ClientEvent, ConnectionState, ConnectionStatus};

/// Timeout for the protocol-detection `/info` probe.
const DETECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Errors surfaced by the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Owns the one active transport and its lifecycle.
pub struct ConnectionManager {
    http: reqwest::Client,
    state: Arc<StdRwLock<ConnectionState>>,
    transport: Arc<tokio::sync::Mutex<Option<RelayTransport>>>,
    roster: RosterStore,
    /// Consumer-installed inbound event handler, shared with every
    /// transport this manager opens.
    on_event: Arc<StdMutex<Option<EventCallback>>>,
    events_tx: mpsc::Sender<ClientEvent>,
    events_rx: StdMutex<Option<mpsc::Receiver<ClientEvent>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(roster: RosterStore) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            http: reqwest::Client::new(),
            state: Arc::new(StdRwLock::new(ConnectionState::default())),
            transport: Arc::new(tokio::sync::Mutex::new(None)),
            roster,
            on_event: Arc::new(StdMutex::new(None)),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Current connection snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    pub fn roster(&self) -> RosterStore {
        self.roster.clone()
    }

    pub(crate) fn events_sender(&self) -> mpsc::Sender<ClientEvent> {
        self.events_tx.clone()
    }

    /// Installs the handler for inbound relay events. Replaces any prior
    /// handler; events seen before installation are not replayed.
    pub fn set_event_callback(&self, cb: EventCallback) {
        if let Ok(mut slot) = self.on_event.lock() {
            *slot = Some(cb);
        }
    }

    /// Marks the session registered (driven by the router after the
    /// registration handshake is sent).
    pub(crate) fn set_registered(&self, registered: bool) {
        if let Ok(mut state) = self.state.write() {
            state.is_registered = registered;
        }
    }

    /// Connects to a relay given its HTTP base URL.
    ///
    /// Idempotent: while a connection is opening or open, further calls
    /// return immediately and reuse it — there is never a second
    /// transport. Protocol selection happens here: a `/info` probe
    /// advertising a `wsPort` selects the raw format on that port, any
    /// other outcome (including probe failure) selects the framed format
    /// on the given URL.
    pub async fn connect(&self, url: &str) -> Result<(), ClientError> {
        if matches!(
            self.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Open
        ) {
            debug!("connect ignored — already connecting or open");
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        // Re-check under the lock; a racing call may have won.
        if matches!(
            self.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Open
        ) {
            return Ok(());
        }

        self.set_status(ConnectionStatus::Connecting);

        let (format, ws_url) = match self.detect_protocol(url) {
            Ok(detect) => detect.await,
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected);
                return Err(e);
            }
        };
        info!(url = %url, ws = %ws_url, %format, "connecting to relay");

        let transport = match RelayTransport::connect(&ws_url, format).await {
            Ok(t) => t,
            Err(e) => {
                warn!(url = %ws_url, error = %e, "connection failed");
                self.set_status(ConnectionStatus::Disconnected);
                return Err(e.into());
            }
        };

        // Forward inbound events to the consumer-installed handler.
        let handler = self.on_event.clone();
        transport
            .set_event_callback(Box::new(move |event| {
                if let Ok(guard) = handler.lock()
                    && let Some(cb) = guard.as_ref()
                {
                    cb(event);
                }
            }))
            .await;

        // Any close — clean or not — lands the state machine back in
        // Disconnected with registration and roster cleared.
        let state = self.state.clone();
        let roster = self.roster.clone();
        let events_tx = self.events_tx.clone();
        transport
            .set_disconnect_callback(Box::new(move || {
                mark_disconnected(&state, &roster, &events_tx);
            }))
            .await;

        if let Ok(mut state) = self.state.write() {
            state.status = ConnectionStatus::Open;
            state.protocol = Some(format);
            state.my_peer_id = Some(transport.session_id().to_string());
            state.is_registered = false;
        }
        *self.transport.lock().await = Some(transport);
        let _ = self
            .events_tx
            .try_send(ClientEvent::StatusChanged(ConnectionStatus::Open));
        info!("relay connection open");
        Ok(())
    }

    /// Disconnects. Safe to call at any time, any number of times.
    pub async fn disconnect(&self) {
        if self.status() == ConnectionStatus::Disconnected
            && self.transport.lock().await.is_none()
        {
            return;
        }
        self.set_status(ConnectionStatus::Closing);
        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await;
        }
        mark_disconnected(&self.state, &self.roster, &self.events_tx);
        debug!("relay connection closed");
    }

    /// Sends one event over the live transport.
    pub async fn send(&self, event: &Event) -> Result<(), ClientError> {
        let transport = self.transport.lock().await;
        let transport = transport.as_ref().ok_or(ClientError::NotConnected)?;
        transport.send(event).await?;
        Ok(())
    }

    fn set_status(&self, status: ConnectionStatus) {
        if let Ok(mut state) = self.state.write() {
            if state.status == status {
                return;
            }
            state.status = status;
        }
        let _ = self.events_tx.try_send(ClientEvent::StatusChanged(status));
    }

    /// Builds the detection future. URL parsing happens eagerly so an
    /// unusable URL fails fast instead of degrading into a framed attempt
    /// against garbage.
    fn detect_protocol(
        &self,
        url: &str,
    ) -> Result<impl Future<Output = (WireFormat, String)> + use<>, ClientError> {
        let base = url.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&base)
            .map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl(format!("{url}: missing host")))?
            .to_string();
        let framed_url = to_ws_url(&parsed);
        let http = self.http.clone();

        Ok(async move {
            let info: Option<ServerInfo> = async {
                let response = http
                    .get(format!("{base}/info"))
                    .timeout(DETECT_TIMEOUT)
                    .send()
                    .await
                    .ok()?;
                if !response.status().is_success() {
                    return None;
                }
                response.json().await.ok()
            }
            .await;

            match info.and_then(|i| i.ws_port) {
                Some(ws_port) => (WireFormat::Raw, format!("ws://{host}:{ws_port}")),
                None => (WireFormat::Framed, framed_url),
            }
        })
    }
}

/// Maps an HTTP base URL onto its WebSocket equivalent.
fn to_ws_url(parsed: &reqwest::Url) -> String {
    let scheme = if parsed.scheme() == "https" { "wss" } else { "ws" };
    let host = parsed.host_str().unwrap_or_default();
    match parsed.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    }
}

/// Shared by the disconnect callback and explicit disconnects; tolerant
/// of being invoked from both paths for the same close.
fn mark_disconnected(
    state: &Arc<StdRwLock<ConnectionState>>,
    roster: &RosterStore,
    events_tx: &mpsc::Sender<ClientEvent>,
) {
    let transitioned = match state.write() {
        Ok(mut state) => {
            if state.status == ConnectionStatus::Disconnected {
                false
            } else {
                *state = ConnectionState::default();
                true
            }
        }
        Err(_) => false,
    };
    if transitioned {
        roster.clear_connection_state();
        let _ = events_tx.try_send(ClientEvent::StatusChanged(ConnectionStatus::Disconnected));
    }
}

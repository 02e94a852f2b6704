//! WebSocket transport for one relay connection.
//!
//! Both wire formats ride on the same transport; the format only changes
//! how frames are encoded and decoded at the edges. The transport owns the
//! read/write/ping pump tasks and a session id that stands in for the
//! connection identity for as long as the socket lives.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;
use tracing::debug;

use deskfriends_protocol::{Event, WireFormat, encode};

use crate::pumps::MAX_FRAME_SIZE;

/// Errors from the relay transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] deskfriends_protocol::CodecError),

    #[error("connection closed")]
    Closed,
}

/// Callback type for inbound events.
pub type EventCallback = Box<dyn Fn(Event) + Send + Sync>;

/// Callback type for disconnect notification.
pub(crate) type DisconnectCallback = Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>;

/// One live WebSocket connection to a relay.
pub struct RelayTransport {
    format: WireFormat,
    /// Session-scoped peer id. The plain WebSocket protocols hand back no
    /// connection id, so the client synthesizes one and carries it in the
    /// registration payload; a reconnect always gets a fresh id.
    session_id: String,
    write_tx: mpsc::Sender<tungstenite::Message>,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    on_disconnect: DisconnectCallback,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: tokio_util::sync::CancellationToken,
}

impl RelayTransport {
    /// Opens the WebSocket and starts the pumps.
    pub async fn connect(ws_url: &str, format: WireFormat) -> Result<Self, TransportError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_SIZE);
        ws_config.max_frame_size = Some(MAX_FRAME_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(ws_url, Some(ws_config), false).await?;
        let (write, read) = futures_util::StreamExt::split(ws_stream);

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let on_event: Arc<Mutex<Option<EventCallback>>> = Arc::new(Mutex::new(None));
        let on_disconnect: DisconnectCallback = Arc::new(Mutex::new(None));
        let cancel = tokio_util::sync::CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let on_event = on_event.clone();
            let on_disconnect = on_disconnect.clone();
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                format,
                on_event,
                on_disconnect,
                write_tx,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(url = %ws_url, %format, session = %session_id, "transport open");

        Ok(Self {
            format,
            session_id,
            write_tx,
            on_event,
            on_disconnect,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        })
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Encodes and queues one event for sending.
    pub async fn send(&self, event: &Event) -> Result<(), TransportError> {
        let text = encode(self.format, event)?;
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(())
    }

    /// Sets the callback for inbound events. Events arriving before a
    /// callback is set are dropped, not replayed.
    pub async fn set_event_callback(&self, cb: EventCallback) {
        *self.on_event.lock().await = Some(cb);
    }

    /// Sets the callback fired once when the connection dies for any
    /// reason (clean close, error, or pong timeout).
    pub async fn set_disconnect_callback(&self, cb: Box<dyn Fn() + Send + Sync>) {
        *self.on_disconnect.lock().await = Some(cb);
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

//! The live voice session: hello handshake, control frames, and the
//! audio streams in both directions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::BridgeError;
use crate::decode::{DecodeChain, PcmSink, VoiceDecoder};
use crate::playback::{PlaybackHandle, PlaybackQueue};
use crate::types::DeviceIdentity;

pub(crate) const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback for control frames this crate does not interpret (tool
/// calls, emotion hints, transcripts). Receives the raw JSON.
pub type ControlCallback = Box<dyn Fn(serde_json::Value) + Send + Sync>;

#[derive(Serialize)]
struct HelloFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    device_id: &'a str,
    device_name: &'a str,
    device_mac: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    features: HelloFeatures,
}

#[derive(Serialize)]
struct HelloFeatures {
    mcp: bool,
}

#[derive(Serialize)]
struct ListenFrame<'a> {
    session_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    state: &'static str,
    mode: &'static str,
}

/// The fields this crate routes on; everything else stays in the raw
/// JSON handed to the control callback.
#[derive(Debug, Deserialize)]
struct ControlFrame {
    #[serde(rename = "type")]
    kind: String,
    session_id: Option<String>,
    state: Option<String>,
}

/// One authenticated voice session.
///
/// All traffic after the handshake is gated on the server-issued session
/// id; it is stamped on every outbound control frame.
pub struct BridgeSession {
    session_id: String,
    write_tx: mpsc::Sender<tungstenite::Message>,
    playback: PlaybackQueue,
    on_control: Arc<Mutex<Option<ControlCallback>>>,
    on_disconnect: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
}

impl BridgeSession {
    /// Opens the socket, performs the hello handshake, and starts the
    /// pumps. Fails if the server does not answer the hello in time.
    pub async fn connect(
        ws_url: &str,
        token: Option<&str>,
        identity: &DeviceIdentity,
        codec: Option<Box<dyn VoiceDecoder>>,
        sink: Box<dyn PcmSink>,
    ) -> Result<Self, BridgeError> {
        let url = session_url(ws_url, token, identity)?;

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        // Hello goes out before the pumps exist so the reply cannot be
        // consumed elsewhere.
        let hello = HelloFrame {
            kind: "hello",
            device_id: &identity.mac,
            device_name: &identity.name,
            device_mac: &identity.mac,
            token,
            features: HelloFeatures { mcp: true },
        };
        let hello_text =
            serde_json::to_string(&hello).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        write
            .send(tungstenite::Message::Text(hello_text.into()))
            .await?;

        let session_id = tokio::time::timeout(HELLO_TIMEOUT, await_server_hello(&mut read))
            .await
            .map_err(|_| BridgeError::HelloTimeout(HELLO_TIMEOUT))??;
        debug!(session = %session_id, "voice session established");

        let (write_tx, mut write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let cancel = CancellationToken::new();
        let playback = PlaybackQueue::new(sink);
        let on_control: Arc<Mutex<Option<ControlCallback>>> = Arc::new(Mutex::new(None));
        let on_disconnect: Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>> =
            Arc::new(Mutex::new(None));

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        msg = write_rx.recv() => {
                            let Some(msg) = msg else { break };
                            if let Err(e) = write.send(msg).await {
                                warn!("voice socket write error: {e}");
                                break;
                            }
                        }
                    }
                }
                let _ = write.send(tungstenite::Message::Close(None)).await;
            })
        };

        let read_handle = {
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            let playback = playback.handle();
            let on_control = on_control.clone();
            let on_disconnect = on_disconnect.clone();
            tokio::spawn(async move {
                let mut chain = DecodeChain::new(codec);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        msg = read.next() => {
                            match msg {
                                Some(Ok(tungstenite::Message::Binary(data))) => {
                                    if let Some(chunk) = chain.decode(&data) {
                                        playback.enqueue(chunk);
                                    }
                                }
                                Some(Ok(tungstenite::Message::Text(text))) => {
                                    handle_control(&text, &playback, &on_control).await;
                                }
                                Some(Ok(tungstenite::Message::Ping(data))) => {
                                    let _ = write_tx
                                        .send(tungstenite::Message::Pong(data))
                                        .await;
                                }
                                Some(Ok(tungstenite::Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!("voice socket read error: {e}");
                                    break;
                                }
                            }
                        }
                    }
                }
                if let Some(cb) = on_disconnect.lock().await.as_ref() {
                    cb();
                }
            })
        };

        Ok(Self {
            session_id,
            write_tx,
            playback,
            on_control,
            on_disconnect,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Opens the capture stream: voice frames may follow until
    /// [`stop_listening`](Self::stop_listening).
    pub async fn start_listening(&self) -> Result<(), BridgeError> {
        self.send_listen("start").await
    }

    pub async fn stop_listening(&self) -> Result<(), BridgeError> {
        self.send_listen("stop").await
    }

    /// Streams one encoded capture frame, raw binary with no envelope.
    pub async fn send_voice_frame(&self, frame: Vec<u8>) -> Result<(), BridgeError> {
        self.write_tx
            .send(tungstenite::Message::Binary(frame.into()))
            .await
            .map_err(|_| BridgeError::Closed)
    }

    /// Watch channel carrying the "playback fully finished" condition.
    pub fn playback_finished(&self) -> watch::Receiver<bool> {
        self.playback.finished()
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    pub async fn set_control_callback(&self, cb: ControlCallback) {
        *self.on_control.lock().await = Some(cb);
    }

    pub async fn set_disconnect_callback(&self, cb: Box<dyn Fn() + Send + Sync>) {
        *self.on_disconnect.lock().await = Some(cb);
    }

    pub async fn close(&self) {
        self.cancel.cancel();
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
    }

    async fn send_listen(&self, state: &'static str) -> Result<(), BridgeError> {
        let frame = ListenFrame {
            session_id: &self.session_id,
            kind: "listen",
            state,
            mode: "auto",
        };
        let text =
            serde_json::to_string(&frame).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| BridgeError::Closed)
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
    }
}

async fn await_server_hello<S>(read: &mut S) -> Result<String, BridgeError>
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg? {
            tungstenite::Message::Text(text) => {
                let frame: ControlFrame = serde_json::from_str(&text)
                    .map_err(|e| BridgeError::Protocol(format!("bad hello frame: {e}")))?;
                if frame.kind != "hello" {
                    return Err(BridgeError::Protocol(format!(
                        "expected hello, got {}",
                        frame.kind
                    )));
                }
                return frame
                    .session_id
                    .ok_or_else(|| BridgeError::Protocol("hello without session_id".into()));
            }
            tungstenite::Message::Close(_) => return Err(BridgeError::Closed),
            _ => {}
        }
    }
    Err(BridgeError::Closed)
}

async fn handle_control(
    text: &str,
    playback: &PlaybackHandle,
    on_control: &Arc<Mutex<Option<ControlCallback>>>,
) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        warn!("dropping malformed control frame");
        return;
    };
    let Ok(frame) = serde_json::from_value::<ControlFrame>(value.clone()) else {
        warn!("dropping untyped control frame");
        return;
    };

    match (frame.kind.as_str(), frame.state.as_deref()) {
        ("tts", Some("start")) => playback.utterance_started().await,
        ("tts", Some("stop")) => playback.utterance_stopped().await,
        ("hello", _) => trace!("duplicate hello ignored"),
        _ => {
            if let Some(cb) = on_control.lock().await.as_ref() {
                cb(value);
            }
        }
    }
}

fn session_url(
    ws_url: &str,
    token: Option<&str>,
    identity: &DeviceIdentity,
) -> Result<String, BridgeError> {
    let mut url = reqwest::Url::parse(ws_url)
        .map_err(|e| BridgeError::InvalidUrl(format!("{ws_url}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        if let Some(token) = token {
            query.append_pair("authorization", &format!("Bearer {token}"));
        }
        query.append_pair("device-id", &identity.mac);
        query.append_pair("client-id", &identity.client_id);
    }
    Ok(url.into())
}

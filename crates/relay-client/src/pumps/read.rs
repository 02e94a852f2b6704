//! WebSocket read pump — decodes and dispatches inbound relay events.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use deskfriends_protocol::{WireFormat, decode};

use crate::pumps::{MAX_FRAME_SIZE, PONG_WAIT};
use crate::transport::{DisconnectCallback, EventCallback};

/// Reads frames from the WebSocket, decodes them with the connection's
/// wire format, and dispatches typed events in arrival order.
///
/// A pong deadline detects dead connections: any inbound frame resets the
/// timer, and silence beyond [`PONG_WAIT`] ends the pump (firing the
/// disconnect callback). Malformed or unknown frames are logged and
/// dropped; they never tear the connection down.
pub(crate) async fn read_pump<S>(
    mut read: S,
    format: WireFormat,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    on_disconnect: DisconnectCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let pong_deadline = tokio::time::sleep(PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("pong timeout — connection dead, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_frame(&text, format, &on_event).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {} // Binary — the relay never sends any
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if let Some(cb) = on_disconnect.lock().await.as_ref() {
        cb();
    }
}

/// Decodes one text frame and hands the event to the callback.
async fn handle_text_frame(
    text: &str,
    format: WireFormat,
    on_event: &Arc<Mutex<Option<EventCallback>>>,
) {
    if text.len() > MAX_FRAME_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return;
    }

    let event = match decode(format, text) {
        Ok(event) => event,
        Err(e) => {
            warn!(%format, "dropping undecodable frame: {e}");
            return;
        }
    };

    trace!(event = %event.kind(), "received event");

    let guard = on_event.lock().await;
    if let Some(cb) = guard.as_ref() {
        cb(event);
    } else {
        warn!(event = %event.kind(), "no event callback set — dropping event");
    }
}

//! End-to-end tests against a scripted in-process relay.
//!
//! The mock relay speaks the framed wire format over a plain WebSocket.
//! It serves no `/info` endpoint, so protocol detection exercises the
//! framed fallback path on every connect.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use deskfriends_protocol::{
    Event, MessageKind, PeerInfo, PeerMessage, WireFormat, decode, encode, now_millis,
};
use deskfriends_relay_client::{ClientEvent, ConnectionStatus, RelayClient, RoutedMessage};

/// Scripted relay: on registration it pushes the roster snapshot and the
/// online broadcast, then delivers the pre-programmed messages. Every
/// frame the client sends is forwarded to the test through `inbound`.
struct MockRelay {
    port: u16,
    inbound: mpsc::UnboundedReceiver<Event>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockRelay {
    async fn spawn(script: Vec<Event>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            // The detection probe hits this port with plain HTTP first;
            // keep accepting until a real WebSocket handshake lands.
            let mut ws = loop {
                let (stream, _) = listener.accept().await.unwrap();
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    break ws;
                }
            };

            while let Some(Ok(msg)) = ws.next().await {
                let tungstenite::Message::Text(text) = msg else {
                    continue;
                };
                let event = decode(WireFormat::Framed, &text).unwrap();
                let _ = inbound_tx.send(event.clone());

                if let Event::Register(request) = event {
                    let id = request.id.unwrap();
                    let me = PeerInfo {
                        id: id.clone(),
                        name: request.name,
                        model_path: request.model_path,
                        joined_at: now_millis(),
                    };
                    let rex = PeerInfo {
                        id: "rex-1".into(),
                        name: "Rex".into(),
                        model_path: "rex.model3.json".into(),
                        joined_at: now_millis(),
                    };

                    let mut frames = vec![
                        Event::RosterList(vec![me.clone(), rex]),
                        Event::PeerOnline(me),
                    ];
                    frames.extend(script.iter().cloned());
                    for frame in frames {
                        let text = encode(WireFormat::Framed, &frame).unwrap();
                        ws.send(tungstenite::Message::Text(text.into())).await.unwrap();
                    }
                }
            }
        });

        Self {
            port,
            inbound,
            handle,
        }
    }

    fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn chat(from: &str, content: &str, to: Option<&str>, to_name: Option<&str>) -> Event {
    Event::Message(PeerMessage {
        from_id: format!("id-{from}"),
        from: from.into(),
        content: content.into(),
        to: to.map(str::to_string),
        to_name: to_name.map(str::to_string),
        message_type: MessageKind::MasterToPet,
        is_direct_target: false,
        timestamp: now_millis(),
    })
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn capture_messages(client: &RelayClient) -> Arc<Mutex<Vec<RoutedMessage>>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    client.router().set_message_callback(Box::new(move |m| {
        sink.lock().unwrap().push(m);
    }));
    captured
}

#[tokio::test]
async fn register_populates_roster_and_suppresses_own_online() {
    let mut relay = MockRelay::spawn(Vec::new()).await;
    let client = RelayClient::new();
    let mut events = client.take_events().unwrap();

    client.connect(&relay.url()).await.unwrap();
    assert_eq!(client.state().status, ConnectionStatus::Open);
    assert!(client.router().register("Me", "me.model3.json").await);

    // The relay saw the registration carrying our session id.
    let registered = relay.inbound.recv().await.unwrap();
    let my_id = client.state().my_peer_id.unwrap();
    match registered {
        Event::Register(request) => assert_eq!(request.id.as_deref(), Some(my_id.as_str())),
        other => panic!("expected register, got {other:?}"),
    }

    let roster = client.roster();
    wait_for(|| roster.online_peers().len() == 2).await;

    // Raw roster holds both pets; the derived view drops the local one,
    // and the echoed pet:online for ourselves changed nothing.
    let others = roster.other_peers();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].name, "Rex");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, ClientEvent::Registered { my_peer_id } if *my_peer_id == my_id)));
    assert!(seen
        .iter()
        .any(|e| matches!(e, ClientEvent::RosterReplaced(2))));

    client.disconnect().await;
}

#[tokio::test]
async fn bystander_sees_third_person_framing() {
    let relay = MockRelay::spawn(vec![chat("主人", "sit", Some("rex-1"), Some("Rex"))]).await;
    let client = RelayClient::new();
    let captured = capture_messages(&client);

    client.connect(&relay.url()).await.unwrap();
    assert!(client.router().register("Me", "me.model3.json").await);

    wait_for(|| !captured.lock().unwrap().is_empty()).await;
    let messages = captured.lock().unwrap();
    assert!(!messages[0].is_direct_target);
    assert_eq!(messages[0].display, "[主人] 对 [Rex] 说: sit");
    drop(messages);

    client.disconnect().await;
}

#[tokio::test]
async fn direct_and_broadcast_messages_arrive_verbatim() {
    let relay = MockRelay::spawn(vec![chat("主人", "everyone here", None, None)]).await;
    let client = RelayClient::new();
    let captured = capture_messages(&client);

    client.connect(&relay.url()).await.unwrap();
    assert!(client.router().register("Me", "me.model3.json").await);

    wait_for(|| !captured.lock().unwrap().is_empty()).await;
    let messages = captured.lock().unwrap();
    assert!(messages[0].is_direct_target);
    assert_eq!(messages[0].display, "everyone here");
    drop(messages);

    assert_eq!(client.roster().history().len(), 1);
    client.disconnect().await;
}

#[tokio::test]
async fn outbound_message_reaches_relay() {
    let mut relay = MockRelay::spawn(Vec::new()).await;
    let client = RelayClient::new();

    client.connect(&relay.url()).await.unwrap();
    assert!(client.router().register("Me", "me.model3.json").await);
    let _register = relay.inbound.recv().await.unwrap();

    assert!(
        client
            .router()
            .send_message("over here", Some("rex-1"), Some("Rex"), MessageKind::PetToPet)
            .await
    );

    let sent = relay.inbound.recv().await.unwrap();
    match sent {
        Event::Message(message) => {
            assert_eq!(message.from, "Me");
            assert_eq!(message.content, "over here");
            assert_eq!(message.to.as_deref(), Some("rex-1"));
        }
        other => panic!("expected message, got {other:?}"),
    }

    client.disconnect().await;
}

#[tokio::test]
async fn disconnect_resets_session_for_next_connect() {
    let relay = MockRelay::spawn(Vec::new()).await;
    let client = RelayClient::new();

    client.connect(&relay.url()).await.unwrap();
    let first_id = client.state().my_peer_id.unwrap();
    client.disconnect().await;
    assert_eq!(client.state().status, ConnectionStatus::Disconnected);

    let relay2 = MockRelay::spawn(Vec::new()).await;
    client.connect(&relay2.url()).await.unwrap();
    let second_id = client.state().my_peer_id.unwrap();
    assert_ne!(first_id, second_id);

    client.disconnect().await;
    drop(relay);
}

//! Inbound event routing and outbound messaging.
//!
//! The router sits between the connection manager and the UI surfaces. It
//! turns raw relay events into roster mutations and displayable messages,
//! and enforces the registration gate on everything outbound.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use deskfriends_protocol::{
    ActionKind, Event, MessageKind, PeerAction, PeerInfo, PeerMessage, RegisterRequest, now_millis,
};

use crate::manager::ConnectionManager;
use crate::roster::RosterStore;
use crate::types::{ClientEvent, ConnectionStatus, RoutedMessage};

/// Callback for routed chat messages.
pub type MessageCallback = Box<dyn Fn(RoutedMessage) + Send + Sync>;

/// Callback for peer motion/expression actions.
pub type ActionCallback = Box<dyn Fn(PeerAction) + Send + Sync>;

/// Routes inbound events and sends outbound ones.
pub struct MessageRouter {
    manager: Arc<ConnectionManager>,
    roster: RosterStore,
    events_tx: mpsc::Sender<ClientEvent>,
    on_message: Arc<StdMutex<Option<MessageCallback>>>,
    on_action: Arc<StdMutex<Option<ActionCallback>>>,
}

impl MessageRouter {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            roster: manager.roster(),
            events_tx: manager.events_sender(),
            manager,
            on_message: Arc::new(StdMutex::new(None)),
            on_action: Arc::new(StdMutex::new(None)),
        }
    }

    /// Installs the handler for routed chat messages.
    pub fn set_message_callback(&self, cb: MessageCallback) {
        if let Ok(mut slot) = self.on_message.lock() {
            *slot = Some(cb);
        }
    }

    /// Installs the handler for peer actions.
    pub fn set_action_callback(&self, cb: ActionCallback) {
        if let Ok(mut slot) = self.on_action.lock() {
            *slot = Some(cb);
        }
    }

    /// Announces the local pet to the relay.
    ///
    /// Carries the session id so both protocols address this pet by the
    /// same id the roster will use. Returns `false` without sending when
    /// the connection is not open.
    pub async fn register(&self, name: &str, model_path: &str) -> bool {
        let state = self.manager.state();
        if state.status != ConnectionStatus::Open {
            warn!("register skipped — not connected");
            return false;
        }
        let Some(my_id) = state.my_peer_id else {
            warn!("register skipped — no session id");
            return false;
        };

        let request = RegisterRequest {
            id: Some(my_id.clone()),
            name: name.to_string(),
            model_path: model_path.to_string(),
        };
        if let Err(e) = self.manager.send(&Event::Register(request)).await {
            warn!(error = %e, "register send failed");
            return false;
        }

        self.roster.set_my_peer(PeerInfo {
            id: my_id.clone(),
            name: name.to_string(),
            model_path: model_path.to_string(),
            joined_at: now_millis(),
        });
        self.manager.set_registered(true);
        let _ = self
            .events_tx
            .try_send(ClientEvent::Registered { my_peer_id: my_id });
        debug!(name = %name, "registered with relay");
        true
    }

    /// Sends a chat message. `to` of `None` broadcasts to everyone.
    pub async fn send_message(
        &self,
        content: &str,
        to: Option<&str>,
        to_name: Option<&str>,
        kind: MessageKind,
    ) -> bool {
        let Some(me) = self.sender_identity() else {
            return false;
        };

        let message = PeerMessage {
            from_id: me.id,
            from: me.name,
            content: content.to_string(),
            to: to.map(str::to_string),
            to_name: to_name.map(str::to_string),
            message_type: kind,
            is_direct_target: true,
            timestamp: now_millis(),
        };
        match self.manager.send(&Event::Message(message)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "message send failed");
                false
            }
        }
    }

    /// Sends a motion or expression action. Actions are always broadcast.
    pub async fn send_action(&self, kind: ActionKind, name: &str) -> bool {
        let Some(me) = self.sender_identity() else {
            return false;
        };

        let action = PeerAction {
            pet_id: me.id,
            pet_name: me.name,
            kind,
            name: name.to_string(),
        };
        match self.manager.send(&Event::Action(action)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "action send failed");
                false
            }
        }
    }

    /// Registration gate for outbound traffic.
    fn sender_identity(&self) -> Option<PeerInfo> {
        let state = self.manager.state();
        if state.status != ConnectionStatus::Open || !state.is_registered {
            warn!("send skipped — not connected or not registered");
            return None;
        }
        let me = self.roster.my_peer();
        if me.is_none() {
            warn!("send skipped — local pet unknown");
        }
        me
    }

    /// Routes one inbound relay event.
    pub fn handle_event(&self, event: Event) {
        match event {
            Event::RosterList(peers) => {
                let count = peers.len();
                self.roster.apply_roster_snapshot(peers);
                let _ = self.events_tx.try_send(ClientEvent::RosterReplaced(count));
            }
            Event::PeerOnline(peer) => {
                if self.roster.my_peer_id().as_deref() == Some(peer.id.as_str()) {
                    return; // Our own online announcement echoed back.
                }
                let id = peer.id.clone();
                self.roster.add_peer(peer);
                let _ = self.events_tx.try_send(ClientEvent::PeerJoined(id));
            }
            Event::PeerOffline(id) => {
                self.roster.remove_peer(&id);
                let _ = self.events_tx.try_send(ClientEvent::PeerLeft(id));
            }
            Event::Message(message) => self.route_message(message),
            Event::Action(action) => self.route_action(action),
            Event::Register(_) => {
                // Registration only flows client to relay.
                debug!("ignoring inbound register event");
            }
        }
    }

    /// Applies self-echo suppression and bystander framing, then delivers.
    fn route_message(&self, message: PeerMessage) {
        // Suppression matches on display name for relay interop. Two pets
        // sharing a name will swallow each other's messages; renaming is
        // the known workaround.
        if self
            .roster
            .my_peer()
            .is_some_and(|me| me.name == message.from)
        {
            debug!("dropping self-echo");
            return;
        }

        let my_id = self.roster.my_peer_id();
        // A broadcast addresses everyone directly; framing only applies
        // when the message was aimed at someone else.
        let is_direct = match message.to.as_deref() {
            None => true,
            Some(to) => my_id.as_deref() == Some(to),
        };

        let display = if is_direct {
            message.content.clone()
        } else {
            let target = match message.message_type {
                MessageKind::MasterToPet => message
                    .to_name
                    .clone()
                    .unwrap_or_else(|| message.from.clone()),
                MessageKind::PetToPet => message.to_name.clone().unwrap_or_default(),
            };
            format!("[{}] 对 [{}] 说: {}", message.from, target, message.content)
        };

        let routed = RoutedMessage {
            from_id: message.from_id.clone(),
            from: message.from.clone(),
            display,
            message_type: message.message_type,
            is_direct_target: is_direct,
            timestamp: message.timestamp,
            raw: message,
        };
        self.roster.append_message(routed.clone());

        if let Ok(guard) = self.on_message.lock()
            && let Some(cb) = guard.as_ref()
        {
            cb(routed);
        }
    }

    fn route_action(&self, action: PeerAction) {
        if self
            .roster
            .my_peer()
            .is_some_and(|me| me.name == action.pet_name)
        {
            return;
        }
        if let Ok(guard) = self.on_action.lock()
            && let Some(cb) = guard.as_ref()
        {
            cb(action);
        }
    }
}

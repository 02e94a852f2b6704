//! Shared roster and message history.
//!
//! One store exists per process; UI surfaces mount and unmount freely and
//! all observe the same snapshot through cloned handles. All mutation goes
//! through the operations here so views never drift apart.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tracing::debug;

use deskfriends_protocol::PeerInfo;

use crate::types::RoutedMessage;

/// Default number of routed messages retained in history.
pub const DEFAULT_HISTORY_CAP: usize = 100;

#[derive(Debug)]
struct RosterInner {
    peers: Vec<PeerInfo>,
    my_peer_id: Option<String>,
    my_peer: Option<PeerInfo>,
    history: VecDeque<RoutedMessage>,
    history_cap: usize,
}

/// Cheaply clonable handle to the process-wide roster state.
///
/// Interior locking keeps the snapshot consistent when transport callbacks
/// fire from pump tasks while UI threads read.
#[derive(Clone)]
pub struct RosterStore {
    inner: Arc<RwLock<RosterInner>>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_HISTORY_CAP)
    }

    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RosterInner {
                peers: Vec::new(),
                my_peer_id: None,
                my_peer: None,
                history: VecDeque::new(),
                history_cap: history_cap.max(1),
            })),
        }
    }

    /// Records the local pet after a successful registration.
    pub fn set_my_peer(&self, info: PeerInfo) {
        if let Ok(mut inner) = self.inner.write() {
            inner.my_peer_id = Some(info.id.clone());
            inner.my_peer = Some(info);
        }
    }

    pub fn my_peer(&self) -> Option<PeerInfo> {
        self.inner.read().ok().and_then(|i| i.my_peer.clone())
    }

    pub fn my_peer_id(&self) -> Option<String> {
        self.inner.read().ok().and_then(|i| i.my_peer_id.clone())
    }

    /// Full replace on receipt of the post-registration roster push.
    ///
    /// The raw snapshot includes the local pet; [`other_peers`]
    /// (RosterStore::other_peers) is the derived view that excludes it.
    pub fn apply_roster_snapshot(&self, peers: Vec<PeerInfo>) {
        if let Ok(mut inner) = self.inner.write() {
            debug!(count = peers.len(), "roster snapshot applied");
            inner.peers = peers;
        }
    }

    /// Idempotent upsert: a duplicate online event updates in place
    /// rather than growing the roster.
    pub fn add_peer(&self, peer: PeerInfo) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(existing) = inner.peers.iter_mut().find(|p| p.id == peer.id) {
                *existing = peer;
            } else {
                debug!(peer = %peer.id, name = %peer.name, "peer online");
                inner.peers.push(peer);
            }
        }
    }

    /// Idempotent delete.
    pub fn remove_peer(&self, id: &str) {
        if let Ok(mut inner) = self.inner.write() {
            let before = inner.peers.len();
            inner.peers.retain(|p| p.id != id);
            if inner.peers.len() != before {
                debug!(peer = %id, "peer offline");
            }
        }
    }

    /// Raw roster as last pushed by the relay (may include self).
    pub fn online_peers(&self) -> Vec<PeerInfo> {
        self.inner.read().map(|i| i.peers.clone()).unwrap_or_default()
    }

    /// Everyone except the local pet.
    pub fn other_peers(&self) -> Vec<PeerInfo> {
        self.inner
            .read()
            .map(|i| {
                i.peers
                    .iter()
                    .filter(|p| i.my_peer_id.as_deref() != Some(p.id.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Appends to the bounded history ring; the oldest entry is evicted
    /// once the cap is reached.
    pub fn append_message(&self, msg: RoutedMessage) {
        if let Ok(mut inner) = self.inner.write() {
            if inner.history.len() == inner.history_cap {
                inner.history.pop_front();
            }
            inner.history.push_back(msg);
        }
    }

    pub fn history(&self) -> Vec<RoutedMessage> {
        self.inner
            .read()
            .map(|i| i.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Wipes connection-scoped state on disconnect. History survives; it
    /// belongs to the chat surface, not the connection.
    pub fn clear_connection_state(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.peers.clear();
            inner.my_peer_id = None;
            inner.my_peer = None;
        }
    }
}

impl Default for RosterStore {
    fn default() -> Self {
        Self::new()
    }
}

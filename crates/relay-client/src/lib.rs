//! Relay client for peer presence and messaging.
//!
//! Provides the WebSocket transport with protocol auto-detection, the
//! shared roster store, and inbound/outbound message routing.

pub mod manager;
mod pumps;
pub mod roster;
pub mod router;
pub mod transport;
pub mod types;

pub use manager::{ClientError, ConnectionManager};
pub use roster::RosterStore;
pub use router::{ActionCallback, MessageCallback, MessageRouter};
pub use transport::{EventCallback, RelayTransport, TransportError};
pub use types::{
    ClientEvent, ConnectionState, ConnectionStatus, ReconnectConfig, RoutedMessage,
};

use std::sync::Arc;

/// One-stop handle wiring the manager and the router together.
///
/// Inbound events flow manager to router automatically; consumers only
/// install the message/action callbacks and drive the lifecycle.
pub struct RelayClient {
    manager: Arc<ConnectionManager>,
    router: Arc<MessageRouter>,
}

impl RelayClient {
    pub fn new() -> Self {
        Self::with_roster(RosterStore::new())
    }

    pub fn with_roster(roster: RosterStore) -> Self {
        let manager = Arc::new(ConnectionManager::new(roster));
        let router = Arc::new(MessageRouter::new(manager.clone()));

        let routing = router.clone();
        manager.set_event_callback(Box::new(move |event| routing.handle_event(event)));

        Self { manager, router }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn roster(&self) -> RosterStore {
        self.manager.roster()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// See [`ConnectionManager::take_events`].
    pub fn take_events(&self) -> Option<tokio::sync::mpsc::Receiver<ClientEvent>> {
        self.manager.take_events()
    }

    pub async fn connect(&self, url: &str) -> Result<(), ClientError> {
        self.manager.connect(url).await
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await
    }
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new()
    }
}

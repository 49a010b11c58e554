use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

use crate::lobby::room::Lobby;
use crate::net::subcmd::ClientVersion;
use crate::net::transport::{SendError, Transport};

/// Global player identifier (guild card number)
pub type Guildcard = u32;

/// A connected client as seen by the relay
///
/// Positions are not stored here; they live in the lobby slot the client
/// occupies and are only touched under the lobby lock.
pub struct ClientHandle {
    guildcard: Guildcard,
    version: ClientVersion,
    transport: Arc<dyn Transport>,
    ignored: RwLock<HashSet<Guildcard>>,
    lobby: RwLock<Weak<Lobby>>,
}

impl ClientHandle {
    pub fn new(guildcard: Guildcard, version: ClientVersion, transport: Arc<dyn Transport>) -> Self {
        Self {
            guildcard,
            version,
            transport,
            ignored: RwLock::new(HashSet::new()),
            lobby: RwLock::new(Weak::new()),
        }
    }

    pub fn guildcard(&self) -> Guildcard {
        self.guildcard
    }

    pub fn version(&self) -> ClientVersion {
        self.version
    }

    /// Hand a complete frame to the transport
    pub fn send(&self, frame: &[u8]) -> Result<(), SendError> {
        self.transport.send(frame)
    }

    pub fn ignore(&self, guildcard: Guildcard) {
        self.ignored.write().insert(guildcard);
    }

    pub fn unignore(&self, guildcard: Guildcard) {
        self.ignored.write().remove(&guildcard);
    }

    pub fn has_ignored(&self, guildcard: Guildcard) -> bool {
        self.ignored.read().contains(&guildcard)
    }

    /// Lobby the client currently sits in, if it still exists
    pub fn current_lobby(&self) -> Option<Arc<Lobby>> {
        self.lobby.read().upgrade()
    }

    /// Point the client at `lobby` unless it already sits in a live one
    ///
    /// Check and write happen under one lock, so of two concurrent joins
    /// only one can claim the client.
    pub(crate) fn claim_lobby(&self, lobby: Weak<Lobby>) -> bool {
        let mut current = self.lobby.write();
        if current.upgrade().is_some() {
            return false;
        }
        *current = lobby;
        true
    }

    pub(crate) fn clear_lobby(&self) {
        *self.lobby.write() = Weak::new();
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("guildcard", &self.guildcard)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::lobby::player::ClientHandle;
use crate::lobby::room::{Lobby, LobbyError, LobbyKind, MAX_LOBBY_CAPACITY};

/// Registry of live lobbies
///
/// Creates and destroys lobbies; the relay core only ever locks them.
pub struct LobbyManager {
    lobbies: HashMap<Uuid, Arc<Lobby>>,
    max_lobbies: usize,
    lobby_capacity: usize,
}

impl LobbyManager {
    /// `lobby_capacity` is capped at [`MAX_LOBBY_CAPACITY`]
    pub fn new(max_lobbies: usize, lobby_capacity: usize) -> Self {
        Self {
            lobbies: HashMap::new(),
            max_lobbies,
            lobby_capacity: lobby_capacity.min(MAX_LOBBY_CAPACITY),
        }
    }

    /// Create a new empty lobby
    pub fn create_lobby(&mut self, kind: LobbyKind) -> Result<Arc<Lobby>, ManagerError> {
        if self.lobbies.len() >= self.max_lobbies {
            return Err(ManagerError::TooManyLobbies);
        }

        let lobby = Lobby::new(kind, self.lobby_capacity);
        self.lobbies.insert(lobby.id(), lobby.clone());
        tracing::debug!("Created {:?} lobby {}", kind, lobby.id());

        Ok(lobby)
    }

    /// Place a client in a default lobby with room, creating one if needed
    ///
    /// Returns the slot the client was given.
    pub fn join_default(&mut self, client: &Arc<ClientHandle>) -> Result<u8, ManagerError> {
        if client.current_lobby().is_some() {
            return Err(ManagerError::AlreadyInLobby);
        }

        for lobby in self.lobbies.values() {
            if lobby.kind() != LobbyKind::Default {
                continue;
            }
            match lobby.add_client(client) {
                Ok(slot) => return Ok(slot),
                Err(LobbyError::LobbyFull) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let lobby = self.create_lobby(LobbyKind::Default)?;
        Ok(lobby.add_client(client)?)
    }

    /// Take a client out of its lobby, removing the lobby once empty
    pub fn leave(&mut self, client: &ClientHandle) {
        let Some(lobby) = client.current_lobby() else {
            return;
        };

        if let Err(e) = lobby.remove_client(client) {
            tracing::warn!("Leave for client {} failed: {}", client.guildcard(), e);
        }

        if lobby.is_empty() {
            self.lobbies.remove(&lobby.id());
            tracing::debug!("Removed empty lobby {}", lobby.id());
        }
    }

    pub fn get_lobby(&self, id: Uuid) -> Option<Arc<Lobby>> {
        self.lobbies.get(&id).cloned()
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    /// Total clients across all lobbies
    pub fn client_count(&self) -> usize {
        self.lobbies.values().map(|l| l.member_count()).sum()
    }
}

/// Manager errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("Too many lobbies")]
    TooManyLobbies,
    #[error("Already in a lobby")]
    AlreadyInLobby,
    #[error("Lobby error: {0}")]
    Lobby(#[from] LobbyError),
}

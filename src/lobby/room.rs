use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use uuid::Uuid;

use crate::lobby::player::{ClientHandle, Guildcard};
use crate::net::packet::Position;

/// Largest lobby whose slot indices all fit the one-byte `client_id`
pub const MAX_LOBBY_CAPACITY: usize = u8::MAX as usize + 1;

/// Lobby kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyKind {
    /// Ship lobby players land in after connecting
    Default,
    /// Team game
    Game,
}

/// Occupied lobby slot
#[derive(Debug)]
pub struct Member {
    pub client: Arc<ClientHandle>,
    pub position: Position,
}

/// Slot array guarded by the lobby lock
#[derive(Debug)]
pub struct LobbyState {
    slots: Vec<Option<Member>>,
}

impl LobbyState {
    fn with_capacity(max_clients: usize) -> Self {
        Self {
            slots: (0..max_clients).map(|_| None).collect(),
        }
    }

    pub fn max_clients(&self) -> usize {
        self.slots.len()
    }

    /// Slot index (`client_id`) of a client in this lobby
    pub fn slot_of(&self, client: &ClientHandle) -> Option<u8> {
        self.members()
            .find(|(_, member)| std::ptr::eq(Arc::as_ptr(&member.client), client))
            .map(|(slot, _)| slot)
    }

    pub fn member(&self, slot: u8) -> Option<&Member> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn member_mut(&mut self, slot: u8) -> Option<&mut Member> {
        self.slots.get_mut(slot as usize).and_then(Option::as_mut)
    }

    /// Occupied slots in index order
    pub fn members(&self) -> impl Iterator<Item = (u8, &Member)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, member)| Some((u8::try_from(slot).ok()?, member.as_ref()?)))
    }

    pub fn member_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn insert(&mut self, client: Arc<ClientHandle>) -> Option<u8> {
        let index = self.slots.iter().position(Option::is_none)?;
        let slot = u8::try_from(index).ok()?;
        self.slots[index] = Some(Member {
            client,
            position: Position::default(),
        });
        Some(slot)
    }

    fn remove(&mut self, client: &ClientHandle) -> Option<u8> {
        let slot = self.slot_of(client)?;
        self.slots[slot as usize] = None;
        Some(slot)
    }
}

/// A bounded group of clients sharing broadcasts
///
/// All membership reads and position writes go through [`Lobby::lock`].
#[derive(Debug)]
pub struct Lobby {
    id: Uuid,
    kind: LobbyKind,
    state: Mutex<LobbyState>,
}

impl Lobby {
    /// Create a lobby with `max_clients` slots, capped at [`MAX_LOBBY_CAPACITY`]
    pub fn new(kind: LobbyKind, max_clients: usize) -> Arc<Self> {
        if max_clients > MAX_LOBBY_CAPACITY {
            tracing::warn!(
                "Lobby capacity {} exceeds {}, clamping",
                max_clients,
                MAX_LOBBY_CAPACITY
            );
        }
        let max_clients = max_clients.min(MAX_LOBBY_CAPACITY);

        Arc::new(Self {
            id: Uuid::new_v4(),
            kind,
            state: Mutex::new(LobbyState::with_capacity(max_clients)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> LobbyKind {
        self.kind
    }

    /// Acquire the lobby lock
    pub fn lock(&self) -> MutexGuard<'_, LobbyState> {
        self.state.lock()
    }

    pub fn member_count(&self) -> usize {
        self.lock().member_count()
    }

    pub fn is_empty(&self) -> bool {
        self.member_count() == 0
    }

    pub fn is_full(&self) -> bool {
        let state = self.lock();
        state.member_count() >= state.max_clients()
    }

    /// Place a client in the first free slot
    ///
    /// Fails with `AlreadyInLobby` if the client already sits in a live
    /// lobby, including one joined concurrently from another thread.
    pub fn add_client(self: &Arc<Self>, client: &Arc<ClientHandle>) -> Result<u8, LobbyError> {
        if !client.claim_lobby(Arc::downgrade(self)) {
            return Err(LobbyError::AlreadyInLobby(client.guildcard()));
        }

        let Some(slot) = self.lock().insert(client.clone()) else {
            client.clear_lobby();
            return Err(LobbyError::LobbyFull);
        };

        tracing::debug!(
            "Client {} joined lobby {} in slot {}",
            client.guildcard(),
            self.id,
            slot
        );
        Ok(slot)
    }

    /// Remove a client, returning the slot it held
    pub fn remove_client(&self, client: &ClientHandle) -> Result<u8, LobbyError> {
        let slot = self
            .lock()
            .remove(client)
            .ok_or(LobbyError::NotAMember(client.guildcard()))?;
        client.clear_lobby();

        tracing::debug!(
            "Client {} left lobby {} from slot {}",
            client.guildcard(),
            self.id,
            slot
        );
        Ok(slot)
    }
}

/// Lobby membership errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby is full")]
    LobbyFull,
    #[error("Client {0} is already in a lobby")]
    AlreadyInLobby(Guildcard),
    #[error("Client {0} is not a member of this lobby")]
    NotAMember(Guildcard),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::testing::client;
    use crate::net::subcmd::ClientVersion;

    #[test]
    fn test_lobby_new() {
        let lobby = Lobby::new(LobbyKind::Default, 4);

        assert!(lobby.is_empty());
        assert_eq!(lobby.lock().max_clients(), 4);
        assert_eq!(lobby.kind(), LobbyKind::Default);
    }

    #[test]
    fn test_add_client_fills_first_free_slot() {
        let lobby = Lobby::new(LobbyKind::Default, 4);
        let a = client(1, ClientVersion::Trial).0;
        let b = client(2, ClientVersion::Trial).0;
        let c = client(3, ClientVersion::Trial).0;

        assert_eq!(lobby.add_client(&a).unwrap(), 0);
        assert_eq!(lobby.add_client(&b).unwrap(), 1);
        lobby.remove_client(&a).unwrap();
        assert_eq!(lobby.add_client(&c).unwrap(), 0);

        let state = lobby.lock();
        assert_eq!(state.slot_of(&c), Some(0));
        assert_eq!(state.slot_of(&b), Some(1));
        assert_eq!(state.slot_of(&a), None);
    }

    #[test]
    fn test_client_tracks_lobby() {
        let lobby = Lobby::new(LobbyKind::Game, 4);
        let (a, _) = client(1, ClientVersion::Current);

        lobby.add_client(&a).unwrap();
        assert_eq!(a.current_lobby().map(|l| l.id()), Some(lobby.id()));

        lobby.remove_client(&a).unwrap();
        assert!(a.current_lobby().is_none());
    }

    #[test]
    fn test_lobby_full() {
        let lobby = Lobby::new(LobbyKind::Game, 2);

        lobby.add_client(&client(1, ClientVersion::Trial).0).unwrap();
        lobby.add_client(&client(2, ClientVersion::Trial).0).unwrap();
        assert!(lobby.is_full());

        let result = lobby.add_client(&client(3, ClientVersion::Trial).0);
        assert_eq!(result, Err(LobbyError::LobbyFull));
    }

    #[test]
    fn test_cannot_join_twice() {
        let first = Lobby::new(LobbyKind::Default, 4);
        let second = Lobby::new(LobbyKind::Default, 4);
        let (a, _) = client(1, ClientVersion::Trial);

        first.add_client(&a).unwrap();

        assert_eq!(second.add_client(&a), Err(LobbyError::AlreadyInLobby(1)));
    }

    #[test]
    fn test_remove_non_member() {
        let lobby = Lobby::new(LobbyKind::Default, 4);
        let (a, _) = client(1, ClientVersion::Trial);

        assert_eq!(lobby.remove_client(&a), Err(LobbyError::NotAMember(1)));
    }

    #[test]
    fn test_capacity_capped_to_one_byte_slots() {
        let lobby = Lobby::new(LobbyKind::Default, 300);
        assert_eq!(lobby.lock().max_clients(), MAX_LOBBY_CAPACITY);

        let clients: Vec<_> = (0..=MAX_LOBBY_CAPACITY as u32)
            .map(|gc| client(gc, ClientVersion::Trial).0)
            .collect();
        for c in &clients[..MAX_LOBBY_CAPACITY] {
            lobby.add_client(c).unwrap();
        }

        let overflow = &clients[MAX_LOBBY_CAPACITY];
        assert_eq!(lobby.add_client(overflow), Err(LobbyError::LobbyFull));
        assert!(overflow.current_lobby().is_none());

        let state = lobby.lock();
        assert_eq!(state.slot_of(&clients[255]), Some(255));
        assert_eq!(state.slot_of(&clients[0]), Some(0));
        assert_eq!(state.slot_of(overflow), None);
    }

    #[test]
    fn test_concurrent_joins_claim_client_once() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..50 {
            let first = Lobby::new(LobbyKind::Default, 4);
            let second = Lobby::new(LobbyKind::Default, 4);
            let (a, _) = client(1, ClientVersion::Trial);
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = [first.clone(), second.clone()]
                .into_iter()
                .map(|lobby| {
                    let a = a.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        lobby.add_client(&a).is_ok()
                    })
                })
                .collect();
            let joined: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(joined.iter().filter(|ok| **ok).count(), 1);
            assert_eq!(first.member_count() + second.member_count(), 1);
        }
    }

    #[test]
    fn test_members_in_slot_order() {
        let lobby = Lobby::new(LobbyKind::Default, 4);
        for gc in [10, 20, 30] {
            lobby.add_client(&client(gc, ClientVersion::Trial).0).unwrap();
        }

        let state = lobby.lock();
        let order: Vec<(u8, Guildcard)> = state
            .members()
            .map(|(slot, m)| (slot, m.client.guildcard()))
            .collect();
        assert_eq!(order, vec![(0, 10), (1, 20), (2, 30)]);
    }
}

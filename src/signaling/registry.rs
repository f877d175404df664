//! Room Registry
//!
//! Process-wide mapping from room key to the peers currently in that room.
//!
//! Rooms exist only while they have members: the first join creates one and
//! the last leave removes it in the same step. Callers that must mutate and
//! broadcast atomically hold the write guard from [`RoomRegistry::write`]
//! across both.

use std::collections::BTreeMap;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::core::{PeerId, PeerInfo, RoomKey};
use crate::signaling::session::{ConnectionId, PeerSession};

/// Peers sharing one room key.
#[derive(Debug)]
pub struct Room {
    key: RoomKey,
    /// Members in join order. Rooms are small, so a vector beats a map here.
    members: Vec<PeerSession>,
}

impl Room {
    fn new(key: RoomKey) -> Self {
        Self {
            key,
            members: Vec::new(),
        }
    }

    /// Room key.
    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Look up a member.
    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerSession> {
        self.members.iter().find(|s| s.id() == peer_id)
    }

    /// Members in join order.
    pub fn members(&self) -> impl Iterator<Item = &PeerSession> {
        self.members.iter()
    }

    /// Descriptors of every member in join order.
    pub fn snapshot(&self) -> Vec<PeerInfo> {
        self.members.iter().map(|s| s.info().clone()).collect()
    }

    /// Insert a member. An existing member with the same id is replaced and
    /// returned; the newcomer goes to the back of the join order.
    fn insert(&mut self, session: PeerSession) -> Option<PeerSession> {
        let replaced = self
            .members
            .iter()
            .position(|s| s.id() == session.id())
            .map(|index| self.members.remove(index));
        self.members.push(session);
        replaced
    }

    /// Remove a member, but only if it still belongs to `connection`.
    fn remove(&mut self, peer_id: &PeerId, connection: ConnectionId) -> Option<PeerSession> {
        let index = self
            .members
            .iter()
            .position(|s| s.id() == peer_id && s.connection() == connection)?;
        Some(self.members.remove(index))
    }
}

/// The room map itself. Obtained through [`RoomRegistry`] guards.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: BTreeMap<RoomKey, Room>,
}

impl RoomTable {
    /// Existing room for `key`, or a freshly inserted empty one.
    pub fn get_or_create(&mut self, key: &RoomKey) -> &mut Room {
        self.rooms.entry(key.clone()).or_insert_with(|| {
            info!("Creating room {}", key);
            Room::new(key.clone())
        })
    }

    /// Add a session to the room named by its key.
    ///
    /// Returns the session it displaced, if a member with the same peer id
    /// was already present (last writer wins).
    pub fn join(&mut self, session: PeerSession) -> Option<PeerSession> {
        let room = self.get_or_create(session.room());
        let peer_id = session.id().clone();
        let replaced = room.insert(session);

        debug!("Peer {} joined room {} ({} members)", peer_id, room.key(), room.len());
        replaced
    }

    /// Remove a peer's session from a room, deleting the room once empty.
    ///
    /// A no-op when the member was already removed or has since been
    /// replaced by a session from another connection.
    pub fn leave(
        &mut self,
        key: &RoomKey,
        peer_id: &PeerId,
        connection: ConnectionId,
    ) -> Option<PeerSession> {
        let room = self.rooms.get_mut(key)?;
        let removed = room.remove(peer_id, connection)?;

        if room.is_empty() {
            self.rooms.remove(key);
            info!("Room {} closed", key);
        } else {
            debug!("Peer {} left room {} ({} members)", peer_id, key, room.len());
        }

        Some(removed)
    }

    /// Descriptors of every current member of a room, in join order.
    pub fn snapshot(&self, key: &RoomKey) -> Vec<PeerInfo> {
        self.rooms.get(key).map(Room::snapshot).unwrap_or_default()
    }

    /// Look up a room.
    pub fn room(&self, key: &RoomKey) -> Option<&Room> {
        self.rooms.get(key)
    }

    /// Whether a room is currently addressable.
    pub fn contains_room(&self, key: &RoomKey) -> bool {
        self.rooms.contains_key(key)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of members in a room (0 if it does not exist).
    pub fn member_count(&self, key: &RoomKey) -> usize {
        self.rooms.get(key).map(Room::len).unwrap_or(0)
    }
}

/// Shared, lock-guarded room table.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    table: RwLock<RoomTable>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for a mutation and its broadcast.
    pub async fn write(&self) -> RwLockWriteGuard<'_, RoomTable> {
        self.table.write().await
    }

    /// Shared access for lookups and routing.
    pub async fn read(&self) -> RwLockReadGuard<'_, RoomTable> {
        self.table.read().await
    }

    /// Descriptors of every current member of a room.
    pub async fn snapshot(&self, key: &RoomKey) -> Vec<PeerInfo> {
        self.read().await.snapshot(key)
    }

    /// Whether a room is currently addressable.
    pub async fn contains_room(&self, key: &RoomKey) -> bool {
        self.read().await.contains_room(key)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.read().await.room_count()
    }

    /// Number of members in a room.
    pub async fn member_count(&self, key: &RoomKey) -> usize {
        self.read().await.member_count(key)
    }
}

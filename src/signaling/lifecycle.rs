//! Connection Lifecycle
//!
//! Drives one connection through `Connecting -> Joined -> Left`.
//!
//! Join and leave each run as a single critical section on the registry
//! write lock: the membership change and every message it causes are queued
//! before any other connection can observe the room.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::{Capabilities, DeviceInfo, PeerId, PeerInfo, RoomKey};
use crate::signaling::protocol::{ClientMessage, OutboundMessage, ServerMessage};
use crate::signaling::registry::RoomRegistry;
use crate::signaling::relay::{self, RouteOutcome};
use crate::signaling::session::{ConnectionId, PeerSession};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake done, not yet registered.
    Connecting,
    /// Member of a room.
    Joined,
    /// Gone. Terminal.
    Left,
}

/// Everything the transport learned during the handshake.
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    /// Resolved identity.
    pub peer_id: PeerId,
    /// Normalized network address.
    pub room: RoomKey,
    /// Parsed user agent.
    pub device: DeviceInfo,
    /// Advertised capabilities.
    pub capabilities: Capabilities,
}

/// What the transport should do after an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    /// Directed message routed (or dropped).
    Relayed(RouteOutcome),
    /// Keepalive reply.
    Heartbeat,
    /// Client left; close the connection.
    Disconnect,
    /// Not understood; nothing done.
    Ignored,
}

/// Lifecycle errors.
///
/// These are misuse of the state machine by the transport, never client errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Join called twice.
    #[error("Connection already joined")]
    AlreadyJoined,

    /// Message handled before join.
    #[error("Connection has not joined a room")]
    NotJoined,

    /// Connection already left.
    #[error("Connection already left")]
    AlreadyLeft,
}

/// One client connection as seen by the room logic.
pub struct PeerConnection {
    registry: Arc<RoomRegistry>,
    connection: ConnectionId,
    state: ConnectionState,
    session: Option<PeerSession>,
}

impl PeerConnection {
    /// Create a connection in the `Connecting` state.
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            connection: ConnectionId::next(),
            state: ConnectionState::Connecting,
            session: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transport connection id.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// The session, once joined.
    pub fn session(&self) -> Option<&PeerSession> {
        self.session.as_ref()
    }

    /// Register with the room and announce.
    ///
    /// Order: roster to the newcomer, `peer-joined` to everyone else, then the
    /// newcomer's own `display-name`.
    pub async fn join(
        &mut self,
        upgrade: UpgradeContext,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Result<&PeerSession, LifecycleError> {
        match self.state {
            ConnectionState::Connecting => {}
            ConnectionState::Joined => return Err(LifecycleError::AlreadyJoined),
            ConnectionState::Left => return Err(LifecycleError::AlreadyLeft),
        }

        let info = PeerInfo::new(upgrade.peer_id, upgrade.device, upgrade.capabilities);
        let session = PeerSession::new(info, upgrade.room, self.connection, outbound);
        let key = session.room().clone();

        {
            let mut rooms = self.registry.write().await;

            let roster: Vec<PeerInfo> = rooms
                .snapshot(&key)
                .into_iter()
                .filter(|peer| &peer.id != session.id())
                .collect();

            if let Some(displaced) = rooms.join(session.clone()) {
                warn!(
                    "Peer {} rejoined room {}, displacing connection {}",
                    session.id(),
                    key,
                    displaced.connection()
                );
            }

            session.send(ServerMessage::Peers { peers: roster });
            relay::broadcast_join(&rooms, &key, session.info());
            session.send(ServerMessage::DisplayName {
                display_name: session.info().display_name.clone(),
                device_name: session.info().device_name.clone(),
            });
        }

        info!(
            "Peer {} ({}) joined room {} as \"{}\"",
            session.id(),
            self.connection,
            key,
            session.info().display_name
        );

        self.state = ConnectionState::Joined;
        Ok(&*self.session.insert(session))
    }

    /// Act on one inbound frame.
    pub async fn handle_message(&mut self, bytes: &[u8]) -> Result<MessageAction, LifecycleError> {
        let session = match self.state {
            ConnectionState::Connecting => return Err(LifecycleError::NotJoined),
            ConnectionState::Left => return Err(LifecycleError::AlreadyLeft),
            ConnectionState::Joined => match &self.session {
                Some(session) => session,
                None => return Err(LifecycleError::NotJoined),
            },
        };

        let Some(message) = ClientMessage::parse(bytes) else {
            debug!("Ignoring malformed message from {}", session.id());
            return Ok(MessageAction::Ignored);
        };

        match message {
            ClientMessage::Relay { to, payload } => {
                let rooms = self.registry.read().await;
                Ok(MessageAction::Relayed(relay::route(&rooms, session, &to, payload)))
            }
            ClientMessage::Pong => Ok(MessageAction::Heartbeat),
            ClientMessage::Disconnect => {
                self.leave().await;
                Ok(MessageAction::Disconnect)
            }
            ClientMessage::Unknown => {
                debug!("Ignoring unrecognised message from {}", session.id());
                Ok(MessageAction::Ignored)
            }
        }
    }

    /// Leave the room and tell whoever remains.
    ///
    /// Returns `false` if there was nothing to leave.
    pub async fn leave(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Left);
        if previous != ConnectionState::Joined {
            return false;
        }

        let Some(session) = self.session.take() else {
            return false;
        };
        let key = session.room();

        let removed = {
            let mut rooms = self.registry.write().await;
            let removed = rooms.leave(key, session.id(), self.connection).is_some();
            if removed {
                relay::broadcast_leave(&rooms, key, session.id());
            }
            removed
        };

        if removed {
            info!("Peer {} ({}) left room {}", session.id(), self.connection, key);
        } else {
            debug!(
                "Peer {} ({}) was already displaced from room {}",
                session.id(),
                self.connection,
                key
            );
        }

        removed
    }
}

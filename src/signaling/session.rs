//! Peer Sessions
//!
//! A session binds a peer identity to one live connection inside one room.
//! Sessions are immutable once built; a client must reconnect to change its
//! descriptor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::core::{PeerId, PeerInfo, RoomKey};
use crate::signaling::protocol::OutboundMessage;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of handing a message to a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the transport.
    Queued,
    /// Queue full; message dropped.
    Full,
    /// Connection already gone; message dropped.
    Closed,
}

impl Delivery {
    /// Whether the message was queued.
    pub fn is_queued(self) -> bool {
        self == Delivery::Queued
    }
}

/// Server-side record of one connected peer.
#[derive(Debug, Clone)]
pub struct PeerSession {
    info: PeerInfo,
    room: RoomKey,
    connection: ConnectionId,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl PeerSession {
    /// Create a session.
    pub fn new(
        info: PeerInfo,
        room: RoomKey,
        connection: ConnectionId,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            info,
            room,
            connection,
            outbound,
        }
    }

    /// Peer identity.
    pub fn id(&self) -> &PeerId {
        &self.info.id
    }

    /// Room this session belongs to.
    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    /// Broadcastable descriptor.
    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    /// Connection that created this session.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Queue a message without waiting. Slow consumers lose messages rather
    /// than stalling the sender.
    pub fn send(&self, message: impl Into<OutboundMessage>) -> Delivery {
        match self.outbound.try_send(message.into()) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full for peer {} ({}), dropping message",
                    self.info.id, self.connection
                );
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Peer {} ({}) already closed", self.info.id, self.connection);
                Delivery::Closed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Capabilities, DeviceInfo};
    use crate::signaling::protocol::ServerMessage;

    fn session_with_capacity(capacity: usize) -> (PeerSession, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let info = PeerInfo::new(PeerId::generate(), DeviceInfo::default(), Capabilities::default());
        let session = PeerSession::new(info, RoomKey::from("10.0.0.5"), ConnectionId::next(), tx);
        (session, rx)
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_send_queues_message() {
        let (session, mut rx) = session_with_capacity(4);

        assert_eq!(session.send(ServerMessage::Ping), Delivery::Queued);
        assert_eq!(rx.recv().await, Some(OutboundMessage::Server(ServerMessage::Ping)));
    }

    #[tokio::test]
    async fn test_send_drops_when_full() {
        let (session, _rx) = session_with_capacity(1);

        assert!(session.send(ServerMessage::Ping).is_queued());
        assert_eq!(session.send(ServerMessage::Ping), Delivery::Full);
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (session, rx) = session_with_capacity(1);
        drop(rx);

        assert_eq!(session.send(ServerMessage::Ping), Delivery::Closed);
    }
}

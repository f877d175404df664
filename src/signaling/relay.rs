//! Relay Engine
//!
//! Membership broadcasts and directed message routing. Every function here
//! works on a borrowed [`RoomTable`], so the caller decides which lock it
//! runs under.

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::{PeerId, PeerInfo, RoomKey};
use crate::signaling::protocol::{RelayedMessage, ServerMessage};
use crate::signaling::registry::RoomTable;
use crate::signaling::session::PeerSession;

/// What happened to a directed message.
///
/// Never reported to the sending client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued for the recipient.
    Delivered,
    /// No such peer in the sender's room.
    UnknownPeer,
    /// Recipient found but its queue was full or closed.
    Undeliverable,
}

/// Tell every other member of a room that `joining` has arrived.
///
/// Returns the number of members the event was queued for.
pub fn broadcast_join(table: &RoomTable, key: &RoomKey, joining: &PeerInfo) -> usize {
    let Some(room) = table.room(key) else {
        return 0;
    };

    let event = ServerMessage::PeerJoined {
        peer: joining.clone(),
    };

    room.members()
        .filter(|member| member.id() != &joining.id)
        .filter(|member| member.send(event.clone()).is_queued())
        .count()
}

/// Tell the remaining members of a room that `leaving` has gone.
///
/// Does nothing when the room no longer exists.
pub fn broadcast_leave(table: &RoomTable, key: &RoomKey, leaving: &PeerId) -> usize {
    let Some(room) = table.room(key) else {
        debug!("Room {} closed, no leave broadcast for {}", key, leaving);
        return 0;
    };

    let event = ServerMessage::PeerLeft {
        peer_id: leaving.clone(),
    };

    room.members()
        .filter(|member| member.id() != leaving)
        .filter(|member| member.send(event.clone()).is_queued())
        .count()
}

/// Deliver a directed message to a peer in the sender's own room.
pub fn route(
    table: &RoomTable,
    sender: &PeerSession,
    to: &PeerId,
    payload: Map<String, Value>,
) -> RouteOutcome {
    let target = table.room(sender.room()).and_then(|room| room.get(to));

    let Some(target) = target else {
        debug!("Dropping message from {} to unknown peer {}", sender.id(), to);
        return RouteOutcome::UnknownPeer;
    };

    let message = RelayedMessage::new(sender.id(), payload);
    if target.send(message).is_queued() {
        RouteOutcome::Delivered
    } else {
        RouteOutcome::Undeliverable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Capabilities, DeviceInfo};
    use crate::signaling::protocol::OutboundMessage;
    use crate::signaling::session::ConnectionId;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn session(id: &str, room: &str) -> (PeerSession, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let info = PeerInfo::new(PeerId::from(id), DeviceInfo::default(), Capabilities::default());
        (PeerSession::new(info, RoomKey::from(room), ConnectionId::next(), tx), rx)
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_broadcast_join_skips_joiner() {
        let mut table = RoomTable::default();
        let key = RoomKey::from("10.0.0.5");
        let (p1, mut rx1) = session("p1", "10.0.0.5");
        let (p2, mut rx2) = session("p2", "10.0.0.5");
        let info = p2.info().clone();

        table.join(p1);
        table.join(p2);

        assert_eq!(broadcast_join(&table, &key, &info), 1);
        assert_eq!(
            rx1.try_recv().unwrap(),
            OutboundMessage::Server(ServerMessage::PeerJoined { peer: info })
        );
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_leave_reaches_remaining() {
        let mut table = RoomTable::default();
        let key = RoomKey::from("10.0.0.5");
        let (p1, mut rx1) = session("p1", "10.0.0.5");
        let (p2, mut rx2) = session("p2", "10.0.0.5");
        let c1 = p1.connection();

        table.join(p1);
        table.join(p2);
        table.leave(&key, &PeerId::from("p1"), c1);

        assert_eq!(broadcast_leave(&table, &key, &PeerId::from("p1")), 1);
        assert_eq!(
            rx2.try_recv().unwrap(),
            OutboundMessage::Server(ServerMessage::PeerLeft { peer_id: PeerId::from("p1") })
        );
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_no_leave_broadcast_into_closed_room() {
        let mut table = RoomTable::default();
        let key = RoomKey::from("10.0.0.5");
        let (p1, mut rx1) = session("p1", "10.0.0.5");
        let c1 = p1.connection();

        table.join(p1);
        table.leave(&key, &PeerId::from("p1"), c1);

        assert_eq!(broadcast_leave(&table, &key, &PeerId::from("p1")), 0);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_route_within_room() {
        let mut table = RoomTable::default();
        let (a, mut rx_a) = session("a", "10.0.0.5");
        let (b, mut rx_b) = session("b", "10.0.0.5");
        let sender = a.clone();

        table.join(a);
        table.join(b);

        let outcome = route(&table, &sender, &PeerId::from("b"), payload(json!({"msg": "hi"})));
        assert_eq!(outcome, RouteOutcome::Delivered);

        let OutboundMessage::Relay(relayed) = rx_b.try_recv().unwrap() else {
            panic!("expected relay");
        };
        assert_eq!(relayed.fields(), &payload(json!({"sender": "a", "msg": "hi"})));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_route_never_crosses_rooms() {
        let mut table = RoomTable::default();
        let (a, mut rx_a) = session("a", "10.0.0.5");
        let (b, mut rx_b) = session("b", "10.0.0.6");
        let sender = a.clone();

        table.join(a);
        table.join(b);

        let outcome = route(&table, &sender, &PeerId::from("b"), payload(json!({"msg": "hi"})));
        assert_eq!(outcome, RouteOutcome::UnknownPeer);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_route_to_closed_peer() {
        let mut table = RoomTable::default();
        let (a, _rx_a) = session("a", "10.0.0.5");
        let (b, rx_b) = session("b", "10.0.0.5");
        let sender = a.clone();

        table.join(a);
        table.join(b);
        drop(rx_b);

        let outcome = route(&table, &sender, &PeerId::from("b"), payload(json!({"x": 1})));
        assert_eq!(outcome, RouteOutcome::Undeliverable);
    }
}

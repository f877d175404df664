//! Signaling Layer
//!
//! Identity, room membership and message relay. Transport-agnostic apart
//! from reading handshake headers; the WebSocket plumbing lives in `network/`.

pub mod identity;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;

pub use identity::{IdentityConfig, IdentityResolver, ResolvedIdentity};
pub use lifecycle::{ConnectionState, LifecycleError, MessageAction, PeerConnection, UpgradeContext};
pub use protocol::{ClientMessage, OutboundMessage, RelayedMessage, ServerMessage};
pub use registry::{Room, RoomRegistry, RoomTable};
pub use relay::RouteOutcome;
pub use session::{ConnectionId, Delivery, PeerSession};

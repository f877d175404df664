//! # LAN Relay Server
//!
//! Signaling relay for local peer-to-peer discovery. Clients behind the same
//! network address are grouped into a room, told about each other, and can
//! pass small directed messages to negotiate a direct connection. No file
//! data ever passes through the server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     LAN RELAY SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Value types (no I/O)                      │
//! │  ├── peer.rs     - PeerId, RoomKey, PeerInfo                 │
//! │  ├── device.rs   - User agent classification                 │
//! │  └── names.rs    - Deterministic display names               │
//! │                                                              │
//! │  signaling/      - Room coordination                         │
//! │  ├── identity.rs - Peer id from handshake cookie             │
//! │  ├── registry.rs - Room registry                             │
//! │  ├── session.rs  - Per-peer session and outbound handle      │
//! │  ├── relay.rs    - Broadcasts and directed routing           │
//! │  ├── lifecycle.rs- Join / message / leave state machine      │
//! │  └── protocol.rs - Message types                             │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── address.rs  - Room key normalization                    │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Membership Guarantees
//!
//! - Peers in different rooms never see or reach each other
//! - A joining peer receives the roster before anyone hears about it
//! - Every existing member receives exactly one `peer-joined` per join
//! - Empty rooms are removed immediately; nobody is told about the last departure

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod network;
pub mod signaling;

// Re-export commonly used types
pub use crate::core::{Capabilities, DeviceInfo, PeerId, PeerInfo, RoomKey};
pub use crate::network::{RelayServer, RelayServerError, ServerConfig};
pub use crate::signaling::{
    ClientMessage, IdentityResolver, OutboundMessage, PeerConnection, RoomRegistry, ServerMessage,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

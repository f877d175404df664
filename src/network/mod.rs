//! Network Layer
//!
//! WebSocket transport for signaling connections.
//! Everything about rooms and identity is delegated to `signaling/`.

pub mod address;
pub mod server;

pub use address::{normalize_ip, room_key_for};
pub use server::{ConfigError, RelayServer, RelayServerError, ServerConfig};

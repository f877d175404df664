//! Core value types.
//!
//! Peer identity, room keys and the descriptors peers see of each other.
//! Nothing in this module performs I/O.

pub mod device;
pub mod names;
pub mod peer;

// Re-export core types
pub use device::DeviceInfo;
pub use names::display_name_for;
pub use peer::{Capabilities, PeerId, PeerInfo, RoomKey};

//! Peer Identity and Descriptors
//!
//! Value types shared by every layer: who a peer is, which room it belongs to,
//! and the snapshot other peers get to see.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::device::DeviceInfo;
use super::names::display_name_for;

/// Stable opaque identity of one client across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-presented token if it is a canonical hyphenated UUID.
    ///
    /// The token is kept verbatim so the client sees the exact value it sent.
    pub fn parse_token(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.len() != 36 {
            return None;
        }
        Uuid::parse_str(token).ok().map(|_| Self(token.to_string()))
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Grouping key for mutual discoverability (the observed network address).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    /// Create a room key from an already-normalized address.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Capabilities a client advertises at connection time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Client can negotiate WebRTC data channels.
    pub rtc_supported: bool,
}

/// Broadcastable, immutable description of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Peer identity.
    pub id: PeerId,
    /// Human-friendly name derived from the identity.
    pub display_name: String,
    /// Name of the device, derived from the user agent.
    pub device_name: String,
    /// Device model (e.g. "iPhone").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    /// Operating system name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Browser name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Device class ("mobile", "tablet").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Advertised capabilities.
    #[serde(flatten)]
    pub capabilities: Capabilities,
}

impl PeerInfo {
    /// Build the snapshot for a peer from its identity and device metadata.
    pub fn new(id: PeerId, device: DeviceInfo, capabilities: Capabilities) -> Self {
        let display_name = display_name_for(&id);
        let device_name = device.device_name();

        Self {
            id,
            display_name,
            device_name,
            device_model: device.model,
            os: device.os,
            browser: device.browser,
            device_type: device.device_type,
            capabilities,
        }
    }
}

//! Room Key Normalization
//!
//! Maps a connection to the address its room is keyed by. Behind a reverse
//! proxy the socket address is the proxy's, so the first `X-Forwarded-For`
//! entry is used instead when proxy headers are trusted.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio_tungstenite::tungstenite::http::HeaderMap;

use crate::core::RoomKey;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Room key for a connection.
pub fn room_key_for(remote: SocketAddr, headers: &HeaderMap, trust_proxy: bool) -> RoomKey {
    if trust_proxy {
        if let Some(forwarded) = forwarded_client(headers) {
            return RoomKey::new(normalize_text(forwarded));
        }
    }
    RoomKey::new(normalize_ip(remote.ip()).to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first)
    }
}

fn normalize_text(addr: &str) -> String {
    match addr.parse::<IpAddr>() {
        Ok(ip) => normalize_ip(ip).to_string(),
        Err(_) => addr.to_string(),
    }
}

/// IPv4-mapped IPv6 collapses to IPv4, and both loopbacks to `127.0.0.1`,
/// so the same host is one room however it connected.
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) if v6.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        IpAddr::V4(v4) => IpAddr::V4(v4),
    }
}

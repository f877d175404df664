//! Identity Resolution
//!
//! Runs during the WebSocket handshake. A client that presents a previously
//! issued token keeps its peer id; anyone else gets a fresh one, delivered
//! back as a cookie on the upgrade response.

use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderMap};
use tracing::debug;

use crate::core::PeerId;

/// Identity cookie settings.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
    /// Cookie holding the identity token.
    pub cookie_name: String,
    /// Attributes appended to issued cookies.
    pub cookie_attributes: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cookie_name: "peerid".to_string(),
            cookie_attributes: "SameSite=Strict; Secure".to_string(),
        }
    }
}

impl IdentityConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cookie_name: std::env::var("PEER_COOKIE_NAME").unwrap_or(defaults.cookie_name),
            cookie_attributes: std::env::var("PEER_COOKIE_ATTRIBUTES")
                .unwrap_or(defaults.cookie_attributes),
        }
    }
}

/// Outcome of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// The peer id for this connection.
    pub peer_id: PeerId,
    /// `Set-Cookie` value to issue, when the id is new.
    pub set_cookie: Option<String>,
}

/// Derives peer ids from handshake headers.
#[derive(Clone, Debug, Default)]
pub struct IdentityResolver {
    config: IdentityConfig,
}

impl IdentityResolver {
    /// Create a resolver.
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    /// Resolve the identity for a handshake. Never fails.
    pub fn resolve(&self, headers: &HeaderMap) -> ResolvedIdentity {
        if let Some(peer_id) = self.presented_token(headers) {
            return ResolvedIdentity {
                peer_id,
                set_cookie: None,
            };
        }

        let peer_id = PeerId::generate();
        debug!("Issuing new peer id {}", peer_id);
        let set_cookie = self.cookie_for(&peer_id);

        ResolvedIdentity {
            peer_id,
            set_cookie: Some(set_cookie),
        }
    }

    /// `Set-Cookie` value carrying a peer id.
    pub fn cookie_for(&self, peer_id: &PeerId) -> String {
        if self.config.cookie_attributes.is_empty() {
            format!("{}={}", self.config.cookie_name, peer_id)
        } else {
            format!(
                "{}={}; {}",
                self.config.cookie_name, peer_id, self.config.cookie_attributes
            )
        }
    }

    /// First well-formed identity token among the request's cookies.
    fn presented_token(&self, headers: &HeaderMap) -> Option<PeerId> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .filter(|(name, _)| name.trim() == self.config.cookie_name)
            .find_map(|(_, value)| PeerId::parse_token(value))
    }
}

//! Device Metadata
//!
//! Best-effort classification of a client from its `User-Agent` header.
//! Only used to label peers for humans; nothing in the session logic
//! depends on the result.

use std::sync::LazyLock;
use tracing::error;
use uaparser::{Parser as _, UserAgentParser};

/// Family name the parser reports when no rule matched.
const UNKNOWN_FAMILY: &str = "Other";

static UA_PARSER: LazyLock<Option<UserAgentParser>> = LazyLock::new(|| {
    UserAgentParser::from_bytes(include_bytes!("../../ua-regexes.yaml"))
        .map_err(|e| error!("Failed to load user agent rules: {:?}", e))
        .ok()
});

/// Device description parsed from a user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Operating system name.
    pub os: Option<String>,
    /// Browser name.
    pub browser: Option<String>,
    /// Device model.
    pub model: Option<String>,
    /// Device class ("mobile" or "tablet"; `None` for desktops).
    pub device_type: Option<String>,
}

impl DeviceInfo {
    /// Parse a user agent string.
    pub fn from_user_agent(ua: &str) -> Self {
        let Some(parser) = UA_PARSER.as_ref() else {
            return Self::default();
        };
        let client = parser.parse(ua);

        let os = known(client.os.family.to_string());
        let browser = known(client.user_agent.family.to_string());
        let model = client
            .device
            .model
            .as_ref()
            .map(|model| model.to_string())
            .or_else(|| Some(client.device.family.to_string()))
            .and_then(known)
            .filter(|model| !is_placeholder_model(model));
        let device_type = device_type(ua, os.as_deref(), model.as_deref()).map(str::to_string);

        Self {
            os,
            browser,
            model,
            device_type,
        }
    }

    /// Name shown to other peers: OS followed by model, falling back to browser.
    pub fn device_name(&self) -> String {
        let mut name = String::new();

        if let Some(os) = &self.os {
            name.push_str(&os.replace("Mac OS", "Mac"));
            name.push(' ');
        }

        match (&self.model, &self.browser) {
            (Some(model), _) => name.push_str(model),
            (None, Some(browser)) => name.push_str(browser),
            (None, None) => {}
        }

        let name = name.trim();
        if name.is_empty() {
            "Unknown Device".to_string()
        } else {
            name.to_string()
        }
    }
}

fn known(family: String) -> Option<String> {
    let family = family.trim();
    if family.is_empty() || family == UNKNOWN_FAMILY {
        None
    } else {
        Some(family.to_string())
    }
}

/// Chrome's reduced user agent reports `K` instead of the model; webviews say `wv`.
fn is_placeholder_model(model: &str) -> bool {
    matches!(model, "K" | "wv")
}

fn device_type(ua: &str, os: Option<&str>, model: Option<&str>) -> Option<&'static str> {
    match model {
        Some("iPad") => return Some("tablet"),
        Some("iPhone") | Some("iPod") => return Some("mobile"),
        _ => {}
    }

    if ua.contains("Tablet") {
        Some("tablet")
    } else if ua.contains("Mobi") {
        Some("mobile")
    } else if os == Some("Android") {
        // Android tablets drop the "Mobile" token.
        Some("tablet")
    } else {
        None
    }
}

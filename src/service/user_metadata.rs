//! Request origin details recorded with new pastes

use serde::{Deserialize, Serialize};

/// Who created a paste. Recorded once and never exposed in responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMetadata {
    /// Client address, first `X-Forwarded-For` hop or the peer address
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl UserMetadata {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip: ip.filter(|s| !s.is_empty()),
            user_agent: user_agent.filter(|s| !s.is_empty()),
        }
    }

    /// Pick the client address from an `X-Forwarded-For` value, falling back
    /// to the socket peer.
    pub fn client_ip(forwarded_for: Option<&str>, peer: Option<&str>) -> Option<String> {
        forwarded_for
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or(peer)
            .map(str::to_string)
    }
}

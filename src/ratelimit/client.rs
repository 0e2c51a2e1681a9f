//! Client identity used to key rate limit windows.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use super::tier::ThrottleTier;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// How the caller's identity is derived from a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdentityConfig {
    /// Honour `x-forwarded-for`. Only enable this behind a reverse proxy that
    /// overwrites the header, otherwise any caller can pick its own bucket.
    #[serde(default)]
    pub trust_forwarded_header: bool,

    /// Key shared by every caller whose address cannot be determined
    #[serde(default = "default_fallback_key")]
    pub fallback_key: String,
}

impl Default for ClientIdentityConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_header: false,
            fallback_key: default_fallback_key(),
        }
    }
}

fn default_fallback_key() -> String {
    "unknown".to_string()
}

/// Identity of a caller, as seen by the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key for a request.
    ///
    /// With a trusted proxy the first `x-forwarded-for` hop wins; otherwise the
    /// peer socket address is used. Callers with neither share the fallback key.
    pub fn from_request(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        config: &ClientIdentityConfig,
    ) -> Self {
        if config.trust_forwarded_header {
            let forwarded = headers
                .get(FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());

            if let Some(addr) = forwarded {
                return Self::new(addr);
            }
        }

        match peer {
            Some(addr) => Self::new(addr.ip().to_string()),
            None => Self::new(config.fallback_key.clone()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of one timestamp window: a client's strict and relaxed traffic are
/// counted separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub tier: ThrottleTier,
    pub client: ClientKey,
}

impl WindowKey {
    pub fn new(tier: ThrottleTier, client: ClientKey) -> Self {
        Self { tier, client }
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tier, self.client)
    }
}

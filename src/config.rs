//! Configuration management for Gatehouse.
//!
//! Values come from an optional YAML file, then `GATEHOUSE__SECTION__KEY`
//! environment variables, then built-in defaults.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{GatehouseError, Result};
use crate::ratelimit::{ClientIdentityConfig, TierTable};
use crate::routing::RouteConfig;

const ENV_PREFIX: &str = "GATEHOUSE";
const MIN_SECRET_LEN: usize = 32;
const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Main configuration for the Gatehouse service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatehouseConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Throttle tier limits
    #[serde(default)]
    pub rate_limiting: TierTable,

    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Route classification rules
    #[serde(default)]
    pub routes: RouteConfig,

    /// Client identity derivation
    #[serde(default)]
    pub client_identity: ClientIdentityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Interval between sweeps of idle rate limit windows
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl ServerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_sweep_interval() -> u64 {
    60
}

/// Session cookie configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the cookie holding the sealed token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Maximum session age in seconds. Every check of a token from the same
    /// issuer must use the same value.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Sealing secret, at least 32 bytes
    #[serde(default)]
    pub secret: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_secs: default_session_ttl(),
            secret: String::new(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("ttl_secs", &self.ttl_secs)
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn default_cookie_name() -> String {
    "onboarding_session".to_string()
}

fn default_session_ttl() -> u64 {
    8 * 60 * 60
}

impl GatehouseConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| GatehouseError::Config(e.to_string()))
    }

    /// Load configuration from an optional YAML file layered under
    /// `GATEHOUSE__*` environment variables, and validate it.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::new(path, ::config::FileFormat::Yaml));
        }

        let config: GatehouseConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, tier) in [
            ("strict", self.rate_limiting.strict),
            ("relaxed", self.rate_limiting.relaxed),
        ] {
            if tier.limit == 0 || tier.window_ms == 0 {
                return Err(GatehouseError::Config(format!(
                    "rate_limiting.{} needs a positive limit and window",
                    name
                )));
            }
        }

        if self.session.ttl_secs == 0 || self.session.ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(GatehouseError::Config(format!(
                "session.ttl_secs must be between 1 and {}",
                MAX_SESSION_TTL_SECS
            )));
        }

        if self.session.secret.len() < MIN_SECRET_LEN {
            return Err(GatehouseError::Config(format!(
                "session.secret must be at least {} bytes (set {}__SESSION__SECRET)",
                MIN_SECRET_LEN, ENV_PREFIX
            )));
        }

        if self.session.cookie_name.is_empty() {
            return Err(GatehouseError::Config(
                "session.cookie_name must not be empty".to_string(),
            ));
        }

        if self.server.sweep_interval_secs == 0 {
            return Err(GatehouseError::Config(
                "server.sweep_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings that load fine but are likely wrong when serving behind a
    /// proxy.
    pub fn deployment_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.client_identity.trust_forwarded_header {
            warnings.push(format!(
                "client_identity.trust_forwarded_header is off: behind a proxy every caller \
                 shares the proxy's rate limit bucket and x-original-uri is ignored \
                 (set {}__CLIENT_IDENTITY__TRUST_FORWARDED_HEADER=true)",
                ENV_PREFIX
            ));
        }

        warnings
    }
}

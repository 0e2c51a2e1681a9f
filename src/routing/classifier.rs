//! Route classification rules.
//!
//! Maps a request path to the access it requires and the throttle tier it is
//! counted under. Rules are fixed at startup from configuration.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

use crate::ratelimit::ThrottleTier;

/// Access a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// Reachable without a session
    Public,
    /// Requires a valid session
    Protected,
    /// Requires a valid session with the admin role
    AdminOnly,
}

impl Sensitivity {
    pub fn requires_session(&self) -> bool {
        !matches!(self, Sensitivity::Public)
    }
}

/// Result of classifying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteClassification {
    pub sensitivity: Sensitivity,
    /// `None` for routes that are not throttled (page navigation)
    pub throttle: Option<ThrottleTier>,
    /// Whether the route belongs to the API surface
    pub is_api: bool,
}

/// Path lists driving classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Prefix of the API surface
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Authentication actions, throttled under the strict tier
    #[serde(default = "default_sensitive_paths")]
    pub sensitive_paths: Vec<String>,

    /// Pages reachable without a session
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,

    /// Sections reserved for administrators
    #[serde(default = "default_admin_prefixes")]
    pub admin_prefixes: Vec<String>,

    /// Where unauthenticated page navigations are sent
    #[serde(default = "default_login_redirect")]
    pub login_redirect: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            sensitive_paths: default_sensitive_paths(),
            public_paths: default_public_paths(),
            admin_prefixes: default_admin_prefixes(),
            login_redirect: default_login_redirect(),
        }
    }
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_sensitive_paths() -> Vec<String> {
    [
        "/api/login",
        "/api/admin-login",
        "/api/signup",
        "/api/reset-password",
        "/api/forgot-password",
        "/api/logout",
        "/api/create-admin",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_public_paths() -> Vec<String> {
    ["/", "/signup", "/forgot-password"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_admin_prefixes() -> Vec<String> {
    vec!["/admin".to_string(), "/api/admin".to_string()]
}

fn default_login_redirect() -> String {
    "/".to_string()
}

/// Canonical form of a request path: query and fragment dropped, unreserved
/// percent-escapes decoded, empty and `.` segments removed, `..` resolved, no
/// trailing slash (the root excepted).
fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let decoded = decode_unreserved(path);

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    segments.iter().fold(String::with_capacity(path.len()), |mut out, segment| {
        out.push('/');
        out.push_str(segment);
        out
    })
}

/// Decode `%XX` escapes of unreserved characters (letters, digits, `-._~`).
/// Other escapes, `%2F` included, are left as written.
fn decode_unreserved(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }

    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = hex_value(bytes[i + 1])
                .zip(hex_value(bytes[i + 2]))
                .map(|(hi, lo)| (hi << 4) | lo)
                .filter(|b| b.is_ascii_alphanumeric() || matches!(*b, b'-' | b'.' | b'_' | b'~'));
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    match String::from_utf8(out) {
        Ok(decoded) => Cow::Owned(decoded),
        Err(_) => Cow::Borrowed(path),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// `prefix` matches whole path segments only: `/admin` matches `/admin` and
/// `/admin/users` but not `/administrator`.
fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Classifies request paths against the configured rules.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    api_prefix: String,
    sensitive: HashSet<String>,
    public: HashSet<String>,
    admin_prefixes: Vec<String>,
    login_redirect: String,
}

impl RouteClassifier {
    pub fn new(config: &RouteConfig) -> Self {
        let owned = |paths: &[String]| -> HashSet<String> {
            paths.iter().map(|p| normalize(p)).collect()
        };

        Self {
            api_prefix: normalize(&config.api_prefix),
            sensitive: owned(&config.sensitive_paths),
            public: owned(&config.public_paths),
            admin_prefixes: config.admin_prefixes.iter().map(|p| normalize(p)).collect(),
            login_redirect: config.login_redirect.clone(),
        }
    }

    /// Classify a path. First matching rule wins.
    pub fn classify(&self, path: &str) -> RouteClassification {
        let path = normalize(path);
        let path = path.as_str();
        let is_api = has_segment_prefix(path, &self.api_prefix);
        let is_sensitive = self.sensitive.contains(path);

        let throttle = if is_sensitive {
            Some(ThrottleTier::Strict)
        } else if is_api {
            Some(ThrottleTier::Relaxed)
        } else {
            None
        };

        // Authentication actions have to be reachable without a session.
        let sensitivity = if self.public.contains(path) || is_sensitive {
            Sensitivity::Public
        } else if self
            .admin_prefixes
            .iter()
            .any(|prefix| has_segment_prefix(path, prefix))
        {
            Sensitivity::AdminOnly
        } else {
            Sensitivity::Protected
        };

        RouteClassification {
            sensitivity,
            throttle,
            is_api,
        }
    }

    /// Redirect target for a refused page navigation. Admin sections carry a
    /// hint so the entry page can offer the admin sign-in.
    pub fn redirect_target(&self, classification: &RouteClassification) -> String {
        match classification.sensitivity {
            Sensitivity::AdminOnly => format!("{}?mode=admin", self.login_redirect),
            _ => self.login_redirect.clone(),
        }
    }
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self::new(&RouteConfig::default())
    }
}

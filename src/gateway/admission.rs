//! Per-request admission decision.
//!
//! A request moves through classify, rate check, session check (non-public
//! routes) and role check (admin routes). The first failing stage ends the
//! evaluation; there are no retries.

use axum::http::{header, HeaderMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::GatehouseConfig;
use crate::error::{AdmissionError, Result};
use crate::ratelimit::{Admission, ClientIdentityConfig, ClientKey, RateLimiter};
use crate::routing::{RouteClassification, RouteClassifier, Sensitivity};
use crate::session::{SessionCodec, SessionError, SessionPayload};

/// The parts of an inbound request the gateway looks at.
#[derive(Debug, Clone, Copy)]
pub struct GatewayRequest<'a> {
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    /// Address of the directly connected peer, if known
    pub peer: Option<SocketAddr>,
}

/// A request that may proceed to the downstream handler.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub classification: RouteClassification,
    /// Present for every non-public route
    pub session: Option<SessionPayload>,
}

/// A request refused by the gateway.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub error: AdmissionError,
    pub classification: RouteClassification,
    /// Where a page navigation should be sent instead
    pub redirect_to: String,
}

/// Orchestrates route classification, rate limiting and session checks.
///
/// Built once at startup and shared across request tasks. The rate limiter is
/// the only mutable state it holds.
pub struct Gateway {
    classifier: RouteClassifier,
    limiter: Arc<RateLimiter>,
    codec: SessionCodec,
    clock: Arc<dyn Clock>,
    identity: ClientIdentityConfig,
    cookie_name: String,
    session_ttl: Duration,
}

impl Gateway {
    /// Build a gateway from validated configuration.
    pub fn new(config: &GatehouseConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            classifier: RouteClassifier::new(&config.routes),
            limiter: Arc::new(RateLimiter::new(config.rate_limiting)),
            codec: SessionCodec::new(&config.session.secret)?,
            clock,
            identity: config.client_identity.clone(),
            cookie_name: config.session.cookie_name.clone(),
            session_ttl: config.session.ttl(),
        })
    }

    /// Decide whether a request may proceed.
    pub fn evaluate(&self, request: &GatewayRequest<'_>) -> std::result::Result<Admitted, Rejection> {
        let classification = self.classifier.classify(request.path);
        let reject = |error: AdmissionError| Rejection {
            error,
            classification,
            redirect_to: self.classifier.redirect_target(&classification),
        };

        if let Some(tier) = classification.throttle {
            let client = ClientKey::from_request(request.headers, request.peer, &self.identity);
            if let Admission::Rejected { retry_after_ms } =
                self.limiter.check(&client, tier, self.clock.now_ms())
            {
                return Err(reject(AdmissionError::RateLimitExceeded { retry_after_ms }));
            }
        }

        if !classification.sensitivity.requires_session() {
            trace!(path = request.path, "Admitted public route");
            return Ok(Admitted {
                classification,
                session: None,
            });
        }

        let session = self.read_session(request).map_err(reject)?;

        if classification.sensitivity == Sensitivity::AdminOnly && !session.is_admin() {
            info!(
                path = request.path,
                user = %session.user_email,
                role = %session.user_role,
                "Non-admin session refused on admin route"
            );
            return Err(reject(AdmissionError::InsufficientRole));
        }

        trace!(path = request.path, user = %session.user_email, "Admitted");
        Ok(Admitted {
            classification,
            session: Some(session),
        })
    }

    /// Find and unseal the session cookie.
    fn read_session(&self, request: &GatewayRequest<'_>) -> std::result::Result<SessionPayload, AdmissionError> {
        let Some(token) = find_cookie(request.headers, &self.cookie_name) else {
            debug!(path = request.path, "No session cookie");
            return Err(AdmissionError::MissingSession);
        };

        self.codec
            .unseal(token, self.session_ttl, self.clock.now_ms())
            .map_err(|err| {
                match &err {
                    SessionError::Expired { expired_ms_ago } => {
                        debug!(path = request.path, expired_ms_ago, "Session expired");
                    }
                    other => {
                        warn!(path = request.path, error = %other, "Rejected session token");
                    }
                }
                AdmissionError::from(err)
            })
    }

    /// Seal a payload with this gateway's codec, as the login flow does.
    pub fn seal(&self, payload: &SessionPayload) -> Result<String> {
        Ok(self.codec.seal(payload, self.clock.now_ms())?)
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    /// Shared handle to the rate limiter, for the sweeper task.
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Whether proxy-supplied headers may describe the caller and the route.
    pub fn trusts_forwarded_headers(&self) -> bool {
        self.identity.trust_forwarded_header
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("classifier", &self.classifier)
            .field("limiter", &self.limiter)
            .field("cookie_name", &self.cookie_name)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

/// Value of the first non-empty cookie called `name` across all `Cookie`
/// headers.
fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.trim_matches('"'))
}

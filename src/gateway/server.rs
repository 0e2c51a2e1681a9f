//! HTTP server exposing the gateway as a forward-auth service.
//!
//! A reverse proxy asks here before passing a request on. Envoy `ext_authz`
//! replays the original path; nginx `auth_request` and Traefik `ForwardAuth`
//! call a fixed path and name the original in `x-original-uri` or
//! `x-forwarded-uri`, which is honoured when forwarded headers are trusted. A
//! `200` means admit and carries the session identity as `x-auth-*` headers.
//! Refusals are 401, 403 or 429; this surface never redirects.

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::admission::Gateway;
use super::middleware::{forward_auth_middleware, Session};
use crate::error::{GatehouseError, Result};

/// Path of the liveness probe. It is served outside the gateway.
pub const HEALTH_PATH: &str = "/_gatehouse/health";

const USER_NAME_HEADER: &str = "x-auth-user-name";
const USER_EMAIL_HEADER: &str = "x-auth-user-email";
const USER_ROLE_HEADER: &str = "x-auth-user-role";
const STAFF_ID_HEADER: &str = "x-auth-staff-id";
const RECORD_ID_HEADER: &str = "x-auth-record-id";

/// Build the router: every path except the health probe goes through the
/// forward-auth middleware.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .fallback(forward_auth)
        .layer(middleware::from_fn_with_state(gateway, forward_auth_middleware))
        .route(HEALTH_PATH, get(health))
}

/// Reached only for admitted requests.
async fn forward_auth(session: Option<Session>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();

    if let Some(Session(payload)) = session {
        let fields = [
            (USER_NAME_HEADER, Some(payload.user_name)),
            (USER_EMAIL_HEADER, Some(payload.user_email)),
            (USER_ROLE_HEADER, Some(payload.user_role.to_string())),
            (STAFF_ID_HEADER, payload.user_staff_id),
            (RECORD_ID_HEADER, payload.record_id),
        ];

        for (name, value) in fields {
            // Values that are not valid header text are left out.
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }

    (StatusCode::OK, headers)
}

async fn health() -> &'static str {
    "ok"
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The gateway instance
    gateway: Arc<Gateway>,
}

impl GatewayServer {
    /// Create a new server for the given gateway.
    pub fn new(addr: SocketAddr, gateway: Arc<Gateway>) -> Self {
        Self { addr, gateway }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting gateway HTTP server with graceful shutdown");

        axum::serve(
            listener,
            router(self.gateway).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GatehouseError::Server(e.to_string())
        })
    }
}

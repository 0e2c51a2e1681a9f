//! HTTP middleware wrapping the gateway.

use axum::{
    extract::{ConnectInfo, FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::admission::{Gateway, GatewayRequest, Rejection};
use crate::error::AdmissionError;
use crate::session::SessionPayload;

const ORIGINAL_URI_HEADERS: [&str; 2] = ["x-original-uri", "x-forwarded-uri"];

/// Body of every refused API call.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

impl Rejection {
    /// Status-only rendering: 429, 401 or 403 with a JSON body, never a
    /// redirect. Forward-auth proxies only understand these.
    pub fn into_status_response(self) -> Response {
        if let AdmissionError::RateLimitExceeded { retry_after_ms } = self.error {
            let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::new("Too many requests. Please try again later.")),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            return response;
        }

        let (status, message) = if self.error.is_unauthenticated() {
            (StatusCode::UNAUTHORIZED, "Unauthorized")
        } else {
            (StatusCode::FORBIDDEN, "Forbidden")
        };

        (status, Json(ErrorBody::new(message))).into_response()
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        // Page navigations go back to an entry page rather than a bare status.
        let throttled = matches!(self.error, AdmissionError::RateLimitExceeded { .. });
        if !throttled && !self.classification.is_api {
            return Redirect::to(&self.redirect_to).into_response();
        }

        self.into_status_response()
    }
}

/// Run every request through the gateway. Admitted requests carry their
/// [`SessionPayload`] in the request extensions.
pub async fn admission_middleware(
    State(gateway): State<Arc<Gateway>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    let span = request_span(&request, &path);

    async move {
        match admit(&gateway, &mut request, &path) {
            Ok(()) => next.run(request).await,
            Err(rejection) => rejection.into_response(),
        }
    }
    .instrument(span)
    .await
}

/// Gateway in front of a forward-auth endpoint.
///
/// The proxy's subrequest arrives on a fixed path, so the route is taken from
/// `x-original-uri` (nginx) or `x-forwarded-uri` (Traefik) when forwarded
/// headers are trusted, and from the request path otherwise (Envoy
/// `ext_authz` replays it). Refusals are always plain statuses.
pub async fn forward_auth_middleware(
    State(gateway): State<Arc<Gateway>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = original_path(&request, gateway.trusts_forwarded_headers())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let span = request_span(&request, &path);

    async move {
        match admit(&gateway, &mut request, &path) {
            Ok(()) => next.run(request).await,
            Err(rejection) => rejection.into_status_response(),
        }
    }
    .instrument(span)
    .await
}

fn request_span(request: &Request, path: &str) -> tracing::Span {
    info_span!(
        "admission",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %path
    )
}

/// Evaluate `path` and attach the admitted session to the request.
fn admit(gateway: &Gateway, request: &mut Request, path: &str) -> Result<(), Rejection> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let admitted = gateway
        .evaluate(&GatewayRequest {
            path,
            headers: request.headers(),
            peer,
        })
        .inspect_err(|rejection| {
            tracing::debug!(outcome = rejection.error.kind(), "Request refused");
        })?;

    if let Some(session) = admitted.session {
        request.extensions_mut().insert(session);
    }
    Ok(())
}

/// Path of the request a proxy is asking about, if it says.
fn original_path(request: &Request, trusted: bool) -> Option<String> {
    if !trusted {
        return None;
    }

    ORIGINAL_URI_HEADERS
        .iter()
        .filter_map(|name| request.headers().get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| value.starts_with('/'))
        .map(str::to_owned)
}

/// Extractor for the session the gateway admitted the request with.
#[derive(Debug, Clone)]
pub struct Session(pub SessionPayload);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionPayload>()
            .cloned()
            .map(Session)
            .ok_or_else(|| {
                (StatusCode::UNAUTHORIZED, Json(ErrorBody::new("Unauthorized"))).into_response()
            })
    }
}

impl<S> OptionalFromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<SessionPayload>().cloned().map(Session))
    }
}

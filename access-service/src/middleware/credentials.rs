//! Lifts bearer token, share cookie and device metadata out of a request.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;

use crate::services::share_access::SHARE_SESSION_COOKIE;
use crate::services::{ClientContext, RequestCredentials};
use crate::utils::device_fingerprint;
use crate::AppState;
use service_core::middleware::client_ip_from_parts;

/// Optional client-supplied device identifier mixed into the fingerprint.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Builds the credentials and client context for one request. The device
/// fingerprint is keyed by the configured secret over User-Agent and the
/// optional device id header.
pub fn request_credentials(parts: &Parts, state: &AppState) -> RequestCredentials {
    let user_agent = header_str(&parts.headers, header::USER_AGENT.as_str());
    let device_id = header_str(&parts.headers, DEVICE_ID_HEADER).unwrap_or_default();
    let fingerprint = device_fingerprint(
        state.config.fingerprint_secret(),
        user_agent.unwrap_or_default(),
        device_id,
    );

    let ip = client_ip_from_parts(&parts.headers, &parts.extensions, &state.trusted_proxies).0;
    let jar = CookieJar::from_headers(&parts.headers);

    RequestCredentials {
        bearer: bearer_token(&parts.headers),
        share_session: jar
            .get(SHARE_SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|sid| !sid.is_empty()),
        client: ClientContext {
            fingerprint,
            ip: ip.map(|ip| ip.to_string()),
            user_agent: user_agent.map(str::to_string),
        },
    }
}

/// Never rejects; an anonymous request simply carries no credentials.
pub struct Credentials(pub RequestCredentials);

#[axum::async_trait]
impl FromRequestParts<AppState> for Credentials {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Credentials(request_credentials(parts, state)))
    }
}

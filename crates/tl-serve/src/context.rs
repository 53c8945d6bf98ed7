use crate::AppState;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use tl_core::types::CaptureContext;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

fn header_value(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Best-effort client address: first forwarded hop, then the proxy's real-ip
/// header, then the socket peer.
pub fn network_origin(headers: &HeaderMap, extensions: &Extensions) -> String {
    header_value(headers, FORWARDED_FOR)
        .and_then(|value| {
            value
                .split(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
                .map(ToString::to_string)
        })
        .or_else(|| header_value(headers, REAL_IP))
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| CaptureContext::UNKNOWN.to_string())
}

pub fn capture_context(state: &AppState, headers: &HeaderMap, extensions: &Extensions) -> CaptureContext {
    CaptureContext {
        network_origin: network_origin(headers, extensions),
        client_agent: header_value(headers, USER_AGENT)
            .unwrap_or_else(|| CaptureContext::UNKNOWN.to_string()),
        identity: state.auth.current_actor(headers),
    }
}

/// Extractor form of [`capture_context`] for handlers.
#[derive(Debug, Clone)]
pub struct RequestCapture(pub CaptureContext);

impl FromRequestParts<AppState> for RequestCapture {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(capture_context(state, &parts.headers, &parts.extensions)))
    }
}

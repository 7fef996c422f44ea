//! Client identifier extraction.
//!
//! Forwarded headers are attacker-controlled unless a trusted proxy strips
//! them. Deployments without such a proxy should disable
//! `trust_forwarded_headers` and key on the peer address alone.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;

/// Identifier used when no network signal is available.
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Derive the identifier for a caller.
///
/// Order: first `X-Forwarded-For` entry, `X-Real-IP`, peer address, then
/// [`UNKNOWN_CLIENT`]. Headers are skipped when `trust_forwarded` is false.
pub fn client_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    if trust_forwarded {
        let forwarded = header_str(headers, X_FORWARDED_FOR)
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());
        if let Some(first) = forwarded {
            return first.to_string();
        }

        if let Some(real_ip) = header_str(headers, X_REAL_IP).map(str::trim) {
            if !real_ip.is_empty() {
                return real_ip.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Derive the identifier for an axum request.
///
/// The peer address is only known when the server was started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn from_request(request: &Request, trust_forwarded: bool) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_identifier(request.headers(), peer, trust_forwarded)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

//! Client identity resolution.
//!
//! Forwarding headers are trusted as-is. Deployments without a trusted
//! reverse proxy in front can be spoofed through them.

use std::net::SocketAddr;

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Identity used when neither headers nor a peer address are available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client identity for a request.
///
/// Order: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer IP.
pub fn resolve_client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

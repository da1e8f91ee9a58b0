//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host, X-Real-IP
//! - Identify the gateway and the caller to backends
//! - Strip hop-by-hop headers
//! - Provide the security response header set
//!
//! # Design Decisions
//! - Preserve original client IP in X-Forwarded-For
//! - Never trust existing X-Forwarded-* from untrusted sources
//! - Identity headers from the client are always overwritten

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_GATEWAY: HeaderName = HeaderName::from_static("x-gateway");
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Everything the proxy tells a backend about the original request.
#[derive(Debug)]
pub struct ForwardingInfo<'a> {
    /// Originating client, possibly taken from trusted forwarding headers.
    pub client_ip: IpAddr,
    /// Address of the socket peer the gateway accepted the request from.
    pub peer_ip: IpAddr,
    pub gateway_name: &'a str,
    pub user_id: Option<&'a str>,
    /// Append to an incoming X-Forwarded-For chain instead of replacing it.
    pub trust_forwarded: bool,
}

/// Rewrite request headers for forwarding.
///
/// A trusted X-Forwarded-For chain gets the socket peer appended; otherwise
/// the chain is replaced by the client address. X-Real-IP is always the
/// resolved client.
pub fn apply_forwarding_headers(headers: &mut HeaderMap, info: &ForwardingInfo<'_>) {
    let client = info.client_ip.to_string();

    let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(chain) if info.trust_forwarded => format!("{chain}, {}", info.peer_ip),
        _ => client.clone(),
    };
    insert(headers, X_FORWARDED_FOR, &forwarded_for);
    insert(headers, X_REAL_IP, &client);

    if let Some(host) = headers.remove(header::HOST) {
        headers.insert(X_FORWARDED_HOST, host);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    insert(headers, X_GATEWAY, info.gateway_name);

    headers.remove(&X_USER_ID);
    if let Some(user) = info.user_id {
        insert(headers, X_USER_ID, user);
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => tracing::debug!(header = %name, "Dropping header with invalid value"),
    }
}

/// Response headers added to every gateway response unless already present.
pub fn security_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ),
    ]
}

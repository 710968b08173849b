//! Networking helpers for choosing the ICE host IP to advertise.

use std::net::{IpAddr, SocketAddr};

/// Resolve the single IPv4 address advertised in ICE host candidates.
///
/// The environment override wins. Otherwise the request's `Host` header is
/// used: its port is stripped, literal IPv4 addresses pass through, and
/// hostnames (including `localhost`) resolve to their first IPv4 address.
/// The WebRTC stack requires a literal IP in 1-to-1 NAT mappings, so a
/// name that does not resolve yields `None` and no mapping is installed.
pub async fn resolve_advertise_ip(
    override_ip: Option<&str>,
    host_header: Option<&str>,
) -> Option<String> {
    if let Some(ip) = override_ip {
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    let host = split_host_port(host_header?);
    if host.is_empty() {
        return None;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Some(v4.to_string()),
            IpAddr::V6(_) => None,
        };
    }

    let addrs = tokio::net::lookup_host((host, 0)).await.ok()?;
    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4.ip().to_string()),
            SocketAddr::V6(_) => None,
        })
        .next()
}

/// Strip an optional `:port` suffix from a `Host` header value.
///
/// Handles `host`, `host:port`, and bracketed IPv6 forms.
fn split_host_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or("");
    }
    // A bare IPv6 literal contains multiple colons and carries no port
    if host.matches(':').count() > 1 {
        return host;
    }
    host.split(':').next().unwrap_or("")
}

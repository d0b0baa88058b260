use axum::{extract::ConnectInfo, http::HeaderMap};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Best-known address of the caller.
///
/// The socket peer unless that peer is a trusted proxy, in which case the
/// rightmost `x-forwarded-for` hop that is not itself a trusted proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl ClientIp {
    /// Identity string for keying counters and audit rows.
    pub fn identity(&self) -> String {
        match self.0 {
            Some(ip) => ip.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Proxy addresses whose `x-forwarded-for` entries are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<Vec<IpAddr>>);

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(Arc::new(proxies))
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.iter().any(|proxy| proxy == ip)
    }
}

/// Walks the forwarded chain right to left, skipping trusted hops. An
/// unparsable hop ends the walk since nothing left of it can be trusted.
fn rightmost_untrusted(headers: &HeaderMap, proxies: &TrustedProxies) -> Option<IpAddr> {
    let hops: Vec<&str> = headers
        .get_all(FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    let mut leftmost_trusted = None;
    for hop in hops.into_iter().rev() {
        let ip = hop.parse::<IpAddr>().ok()?;
        if !proxies.contains(&ip) {
            return Some(ip);
        }
        leftmost_trusted = Some(ip);
    }
    leftmost_trusted
}

pub fn client_ip_from_parts(
    headers: &HeaderMap,
    extensions: &http::Extensions,
    proxies: &TrustedProxies,
) -> ClientIp {
    let Some(peer) = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        return ClientIp(None);
    };

    if !proxies.contains(&peer) {
        return ClientIp(Some(peer));
    }
    ClientIp(Some(rightmost_untrusted(headers, proxies).unwrap_or(peer)))
}

//! Client identity derivation.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Where the throttle takes a client's identity from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentitySource {
    /// The peer address of the TCP connection.
    #[default]
    PeerAddress,
    /// The first `X-Forwarded-For` hop, falling back to the peer address.
    ForwardedFor,
}

impl IdentitySource {
    pub fn from_trust(trust_forwarded_for: bool) -> Self {
        if trust_forwarded_for {
            IdentitySource::ForwardedFor
        } else {
            IdentitySource::PeerAddress
        }
    }

    /// The identity key for a request. Ports are dropped so that one host
    /// opening many connections is still one client.
    pub fn identify(&self, peer: SocketAddr, headers: &HeaderMap) -> String {
        if *self == IdentitySource::ForwardedFor {
            if let Some(ip) = first_forwarded_hop(headers) {
                return ip.to_string();
            }
        }
        peer.ip().to_string()
    }
}

fn first_forwarded_hop(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(X_FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.7:51234".parse().unwrap()
    }

    #[test]
    fn peer_address_ignores_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        assert_eq!(IdentitySource::PeerAddress.identify(peer(), &headers), "10.0.0.7");
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(
            IdentitySource::ForwardedFor.identify(peer(), &headers),
            "203.0.113.9"
        );
    }

    #[test]
    fn garbage_forwarded_header_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("not-an-ip"));
        assert_eq!(IdentitySource::ForwardedFor.identify(peer(), &headers), "10.0.0.7");
    }
}

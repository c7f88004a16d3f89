//! Multiaddr-style rendering of endpoint addresses.
//!
//! The transport hands the daemon plain socket addresses; the HTTP
//! surface and the startup banner present them in
//! `/ip4/<host>/udp/<port>/quic-v1` form with the node identity appended
//! as a `/p2p/<id>` suffix.

use std::net::SocketAddr;

/// Render a bound socket as a multiaddr string (no `/p2p/` suffix).
pub fn multiaddr_for_socket(addr: &SocketAddr) -> String {
    match addr {
        SocketAddr::V4(v4) => format!("/ip4/{}/udp/{}/quic-v1", v4.ip(), v4.port()),
        SocketAddr::V6(v6) => format!("/ip6/{}/udp/{}/quic-v1", v6.ip(), v6.port()),
    }
}

/// Append the `/p2p/<peer_id>` suffix.
pub fn with_peer(addr: &str, peer_id: &str) -> String {
    format!("{addr}/p2p/{peer_id}")
}

/// The UDP (or, failing that, TCP) port component of a multiaddr string.
pub fn transport_port(addr: &str) -> Option<u16> {
    let parts: Vec<&str> = addr.split('/').collect();
    for proto in ["udp", "tcp"] {
        for pair in parts.windows(2) {
            if pair[0] == proto {
                return pair[1].parse().ok();
            }
        }
    }
    None
}

/// Pick the advertised bootstrap address: the first `/ip4/` address whose
/// transport port can be recovered, rendered as a loopback QUIC address.
/// Falls back to the first address with the peer suffix appended.
pub fn preferred_bootstrap(addrs: &[String], peer_id: &str) -> Option<String> {
    for addr in addrs {
        if !addr.starts_with("/ip4/") {
            continue;
        }
        if let Some(port) = transport_port(addr) {
            return Some(format!("/ip4/127.0.0.1/udp/{port}/quic-v1/p2p/{peer_id}"));
        }
    }
    addrs.first().map(|a| with_peer(a, peer_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

    #[test]
    fn sockets_render_as_quic_multiaddrs() {
        let v4 = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 4001));
        assert_eq!(multiaddr_for_socket(&v4), "/ip4/10.0.0.1/udp/4001/quic-v1");

        let v6 = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 4001, 0, 0));
        assert_eq!(multiaddr_for_socket(&v6), "/ip6/::1/udp/4001/quic-v1");
    }

    #[test]
    fn transport_port_prefers_udp() {
        assert_eq!(transport_port("/ip4/1.2.3.4/udp/4001/quic-v1"), Some(4001));
        assert_eq!(transport_port("/ip4/1.2.3.4/tcp/4002"), Some(4002));
        assert_eq!(transport_port("/ip4/1.2.3.4"), None);
    }

    #[test]
    fn bootstrap_rewrites_first_ipv4_to_loopback() {
        let addrs = vec![
            "/ip6/::1/udp/9999/quic-v1".to_string(),
            "/ip4/192.168.1.5/udp/4001/quic-v1".to_string(),
        ];
        assert_eq!(
            preferred_bootstrap(&addrs, "peerA").unwrap(),
            "/ip4/127.0.0.1/udp/4001/quic-v1/p2p/peerA"
        );
    }

    #[test]
    fn bootstrap_falls_back_to_first_addr() {
        let addrs = vec!["/ip6/::1/udp/9999/quic-v1".to_string()];
        assert_eq!(
            preferred_bootstrap(&addrs, "peerA").unwrap(),
            "/ip6/::1/udp/9999/quic-v1/p2p/peerA"
        );
        assert!(preferred_bootstrap(&[], "peerA").is_none());
    }
}

//! `Transport` header construction and parsing (RFC 2326 §12.39).
//!
//! The teacher's `TransportHeader::parse` only ever pulled `client_port=`
//! out of a header a *client* sent, because a publishing server never
//! constructs one of these itself. A client does both: it builds the
//! header it sends on `SETUP` from the chosen [`crate::transport::
//! TransportDescriptor`], then parses the server's echoed-and-augmented
//! header out of the `SETUP` response (`server_port=`, a possibly
//! renumbered `interleaved=`, or a multicast `destination=`/`ttl=`).

use std::net::IpAddr;

use crate::transport::TransportDescriptor;

/// Build the `Transport:` request header value for a `SETUP` request.
pub fn build_transport_header(descriptor: &TransportDescriptor) -> String {
    match descriptor {
        TransportDescriptor::Udp { rtp_port, rtcp_port } => {
            format!("RTP/AVP;unicast;client_port={rtp_port}-{rtcp_port}")
        }
        TransportDescriptor::Interleaved { rtp_channel, rtcp_channel } => {
            format!("RTP/AVP/TCP;interleaved={rtp_channel}-{rtcp_channel}")
        }
        TransportDescriptor::Multicast { .. } => "RTP/AVP;multicast".to_string(),
    }
}

/// Parameters the server's `SETUP` response echoed back, parsed out of its
/// `Transport:` header value.
#[derive(Debug, Clone, Default)]
pub struct ParsedTransport {
    pub is_tcp: bool,
    pub is_multicast: bool,
    pub client_port: Option<(u16, u16)>,
    pub server_port: Option<(u16, u16)>,
    pub interleaved: Option<(u8, u8)>,
    pub destination: Option<IpAddr>,
    pub ttl: Option<u32>,
}

/// Parse one `Transport:` response header value.
///
/// A server may return multiple comma-separated transport specs when it
/// supports more than one for the same `SETUP`; this client always offers
/// exactly one, so only the first spec is parsed.
pub fn parse_transport_response(value: &str) -> ParsedTransport {
    let spec = value.split(',').next().unwrap_or(value);
    let mut parsed = ParsedTransport::default();

    for (i, part) in spec.split(';').enumerate() {
        let part = part.trim();
        if i == 0 {
            parsed.is_tcp = part.eq_ignore_ascii_case("RTP/AVP/TCP");
            continue;
        }
        if part.eq_ignore_ascii_case("multicast") {
            parsed.is_multicast = true;
        } else if let Some(ports) = part.strip_prefix("client_port=") {
            parsed.client_port = parse_port_pair(ports);
        } else if let Some(ports) = part.strip_prefix("server_port=") {
            parsed.server_port = parse_port_pair(ports);
        } else if let Some(channels) = part.strip_prefix("interleaved=") {
            parsed.interleaved = parse_u8_pair(channels);
        } else if let Some(dest) = part.strip_prefix("destination=") {
            parsed.destination = dest.trim().parse().ok();
        } else if let Some(ttl) = part.strip_prefix("ttl=") {
            parsed.ttl = ttl.trim().parse().ok();
        }
    }

    parsed
}

fn parse_port_pair(s: &str) -> Option<(u16, u16)> {
    let (a, b) = s.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn parse_u8_pair(s: &str) -> Option<(u8, u8)> {
    let (a, b) = s.split_once('-')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_udp_header() {
        let descriptor = TransportDescriptor::Udp { rtp_port: 8000, rtcp_port: 8001 };
        assert_eq!(
            build_transport_header(&descriptor),
            "RTP/AVP;unicast;client_port=8000-8001"
        );
    }

    #[test]
    fn builds_interleaved_header() {
        let descriptor = TransportDescriptor::Interleaved { rtp_channel: 0, rtcp_channel: 1 };
        assert_eq!(build_transport_header(&descriptor), "RTP/AVP/TCP;interleaved=0-1");
    }

    #[test]
    fn parses_udp_server_response() {
        let parsed = parse_transport_response(
            "RTP/AVP;unicast;client_port=8000-8001;server_port=5000-5001",
        );
        assert!(!parsed.is_tcp);
        assert_eq!(parsed.client_port, Some((8000, 8001)));
        assert_eq!(parsed.server_port, Some((5000, 5001)));
    }

    #[test]
    fn parses_interleaved_server_response_with_renumbered_channels() {
        let parsed = parse_transport_response("RTP/AVP/TCP;interleaved=2-3");
        assert!(parsed.is_tcp);
        assert_eq!(parsed.interleaved, Some((2, 3)));
    }

    #[test]
    fn parses_multicast_server_response() {
        let parsed = parse_transport_response(
            "RTP/AVP;multicast;destination=239.1.1.1;port=5000-5001;ttl=16",
        );
        assert!(parsed.is_multicast);
        assert_eq!(parsed.destination, Some("239.1.1.1".parse().unwrap()));
        assert_eq!(parsed.ttl, Some(16));
    }
}

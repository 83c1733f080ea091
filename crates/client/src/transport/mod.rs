//! RTP/RTCP transport abstraction.
//!
//! RTSP negotiates one of three ways media actually travels (RFC 2326
//! §12.39 `Transport` header):
//!
//! - [`udp`]: two dedicated UDP ports per track (RTP + RTCP), the classic
//!   `RTP/AVP` transport. Generalizes the teacher's `UdpTransport` (a
//!   single ephemeral send-only socket for a publishing server) into a
//!   bind-and-retry allocator, since a client must actually own local
//!   ports to receive on, not just hand out port numbers to others.
//! - [`interleaved`]: RTP/RTCP multiplexed onto the RTSP TCP connection
//!   itself via `$` framing (`RTP/AVP/TCP;interleaved=`), which the
//!   teacher's server explicitly rejected (`handler::handle_setup`
//!   returned `461 Unsupported Transport` for it) but a client must
//!   support — many NAT/firewall-constrained cameras only offer this mode.
//! - [`multicast`]: one shared multicast group address for all receivers
//!   of a track (`RTP/AVP;multicast`).

pub mod interleaved;
pub mod multicast;
pub mod udp;

use std::sync::mpsc;

use crate::Result;

/// A received RTP or RTCP datagram, regardless of which [`RtpTransport`]
/// delivered it.
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    pub payload: Vec<u8>,
}

/// Common interface over the three ways RTP/RTCP data can move once a
/// session is set up. The client state machine only talks to this trait —
/// it never touches a raw socket or the listener's interleaved-frame
/// channel directly.
pub trait RtpTransport: Send {
    /// Begin receiving. Returns channels the caller polls for arriving RTP
    /// and RTCP packets.
    fn start(&mut self) -> Result<(mpsc::Receiver<ReceivedPacket>, mpsc::Receiver<ReceivedPacket>)>;

    /// Stop receiving and release any held resources (sockets, channel
    /// registrations).
    fn stop(&mut self);

    /// Send an RTCP packet upstream (e.g. a Receiver Report).
    fn write_control(&self, payload: &[u8]) -> Result<()>;

    /// The client-side port pair, or interleaved channel pair, to present
    /// in the `SETUP` request's `Transport` header.
    fn client_descriptor(&self) -> TransportDescriptor;
}

/// The client-side half of a negotiated `Transport` header, independent of
/// which concrete transport backs it.
#[derive(Debug, Clone)]
pub enum TransportDescriptor {
    Udp { rtp_port: u16, rtcp_port: u16 },
    Interleaved { rtp_channel: u8, rtcp_channel: u8 },
    Multicast { address: std::net::IpAddr, rtp_port: u16, rtcp_port: u16 },
}

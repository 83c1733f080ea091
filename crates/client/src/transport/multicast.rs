//! Multicast RTP/RTCP transport (`RTP/AVP;multicast`, RFC 2326 §10.4,
//! §12.39).
//!
//! A `SETUP` response that negotiates multicast names a group address the
//! server is already sending to; every receiver joins the same group
//! instead of the server opening a per-client port pair. This reuses
//! [`udp::UdpTransport`]'s read-loop shape but binds to the group address
//! itself and calls `join_multicast_v4`/`join_multicast_v6` rather than
//! allocating a fresh ephemeral port pair.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{ReceivedPacket, RtpTransport, TransportDescriptor};
use crate::error::RtspError;
use crate::Result;

const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct MulticastTransport {
    address: IpAddr,
    rtp_socket: Arc<UdpSocket>,
    rtcp_socket: Arc<UdpSocket>,
    rtp_port: u16,
    rtcp_port: u16,
    ttl: Option<u32>,
    remote: Mutex<Option<SocketAddr>>,
    running: Arc<AtomicBool>,
}

impl MulticastTransport {
    /// Bind and join the group named by a `SETUP` response's
    /// `Transport: ...;destination=<addr>;port=a-b;ttl=<n>`.
    pub fn join(address: IpAddr, rtp_port: u16, rtcp_port: u16, ttl: Option<u32>) -> Result<Self> {
        if !address.is_multicast() {
            return Err(RtspError::ProtocolViolation(format!(
                "{address} is not a multicast address"
            )));
        }

        let rtp_socket = bind_and_join(address, rtp_port)?;
        let rtcp_socket = bind_and_join(address, rtcp_port)?;
        rtp_socket.set_read_timeout(Some(SOCKET_READ_TIMEOUT))?;
        rtcp_socket.set_read_timeout(Some(SOCKET_READ_TIMEOUT))?;

        Ok(Self {
            address,
            rtp_socket: Arc::new(rtp_socket),
            rtcp_socket: Arc::new(rtcp_socket),
            rtp_port,
            rtcp_port,
            ttl,
            remote: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Multicast senders are usually unknown until the first datagram
    /// arrives; record the source so `write_control` has somewhere to send
    /// Receiver Reports.
    pub fn note_sender(&self, addr: SocketAddr) {
        *self.remote.lock() = Some(addr);
    }

    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }
}

fn bind_and_join(group: IpAddr, port: u16) -> Result<UdpSocket> {
    match group {
        IpAddr::V4(addr) => {
            let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
            socket.join_multicast_v4(&addr, &Ipv4Addr::UNSPECIFIED)?;
            Ok(socket)
        }
        IpAddr::V6(addr) => {
            let socket = UdpSocket::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))?;
            socket.join_multicast_v6(&addr, 0)?;
            Ok(socket)
        }
    }
}

impl RtpTransport for MulticastTransport {
    fn start(&mut self) -> Result<(mpsc::Receiver<ReceivedPacket>, mpsc::Receiver<ReceivedPacket>)> {
        self.running.store(true, Ordering::SeqCst);

        let (rtp_tx, rtp_rx) = mpsc::channel();
        let (rtcp_tx, rtcp_rx) = mpsc::channel();

        spawn_reader(self.rtp_socket.clone(), self.running.clone(), rtp_tx);
        spawn_reader(self.rtcp_socket.clone(), self.running.clone(), rtcp_tx);

        Ok((rtp_rx, rtcp_rx))
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn write_control(&self, payload: &[u8]) -> Result<()> {
        let remote = *self.remote.lock();
        let dest = remote.ok_or_else(|| {
            RtspError::TransportUnreachable("no multicast sender observed yet".into())
        })?;
        self.rtcp_socket.send_to(payload, dest)?;
        Ok(())
    }

    fn client_descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::Multicast {
            address: self.address,
            rtp_port: self.rtp_port,
            rtcp_port: self.rtcp_port,
        }
    }
}

fn spawn_reader(socket: Arc<UdpSocket>, running: Arc<AtomicBool>, tx: mpsc::Sender<ReceivedPacket>) {
    thread::spawn(move || {
        let mut buf = vec![0u8; 65536];
        while running.load(Ordering::SeqCst) {
            match socket.recv_from(&mut buf) {
                Ok((n, _src)) => {
                    if tx.send(ReceivedPacket { payload: buf[..n].to_vec() }).is_err() {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    tracing::debug!(error = %e, "multicast transport read error");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unicast_address() {
        let err = MulticastTransport::join("192.168.1.1".parse().unwrap(), 20600, 20601, None);
        assert!(err.is_err());
    }

    #[test]
    fn joins_ipv4_group_and_reports_descriptor() {
        let transport = MulticastTransport::join("239.1.1.1".parse().unwrap(), 20700, 20701, Some(16)).unwrap();
        match transport.client_descriptor() {
            TransportDescriptor::Multicast { address, rtp_port, rtcp_port } => {
                assert_eq!(address, "239.1.1.1".parse::<IpAddr>().unwrap());
                assert_eq!(rtp_port, 20700);
                assert_eq!(rtcp_port, 20701);
            }
            other => panic!("expected Multicast descriptor, got {other:?}"),
        }
    }

    #[test]
    fn write_control_without_observed_sender_errors() {
        let transport = MulticastTransport::join("239.1.1.2".parse().unwrap(), 20800, 20801, None).unwrap();
        assert!(transport.write_control(b"x").is_err());
    }
}

//! UDP RTP/RTCP transport (`RTP/AVP`, RFC 2326 §10.4).
//!
//! Generalizes the teacher's `UdpTransport` — a single ephemeral send-only
//! socket a publishing server used for outbound RTP — into a bind-and-retry
//! port-pair allocator: a client must bind two *specific* local ports (one
//! even for RTP, the next odd for RTCP, RFC 3550 §11) to receive on, the
//! same even/odd convention the teacher's
//! `session::SessionManager::allocate_server_ports` hands out, except here
//! the ports are actually bound rather than just counted.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{ReceivedPacket, RtpTransport, TransportDescriptor};
use crate::error::RtspError;
use crate::Result;

const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct UdpTransport {
    rtp_socket: Arc<UdpSocket>,
    rtcp_socket: Arc<UdpSocket>,
    local_rtp_port: u16,
    local_rtcp_port: u16,
    remote: Arc<Mutex<Option<(SocketAddr, SocketAddr)>>>,
    running: Arc<AtomicBool>,
}

impl UdpTransport {
    /// Bind the first available consecutive even/odd port pair in
    /// `range`, retrying on `AddrInUse` the way a client must (unlike a
    /// server, which can just increment a counter and trust the OS).
    pub fn bind_port_pair(range: RangeInclusive<u16>) -> Result<Self> {
        let mut port = *range.start();
        if port % 2 != 0 {
            port += 1;
        }
        while port < *range.end() {
            let rtp_addr = SocketAddr::from(([0, 0, 0, 0], port));
            let rtcp_addr = SocketAddr::from(([0, 0, 0, 0], port + 1));
            match (UdpSocket::bind(rtp_addr), UdpSocket::bind(rtcp_addr)) {
                (Ok(rtp), Ok(rtcp)) => {
                    rtp.set_read_timeout(Some(SOCKET_READ_TIMEOUT))?;
                    rtcp.set_read_timeout(Some(SOCKET_READ_TIMEOUT))?;
                    return Ok(Self {
                        rtp_socket: Arc::new(rtp),
                        rtcp_socket: Arc::new(rtcp),
                        local_rtp_port: port,
                        local_rtcp_port: port + 1,
                        remote: Arc::new(Mutex::new(None)),
                        running: Arc::new(AtomicBool::new(false)),
                    });
                }
                _ => port += 2,
            }
        }
        Err(RtspError::TransportUnreachable(format!(
            "no free UDP port pair in {}..={}",
            range.start(),
            range.end()
        )))
    }

    /// Record the server's RTP/RTCP endpoints once the `SETUP` response's
    /// `Transport: ...;server_port=a-b` confirms them.
    pub fn set_remote(&self, rtp: SocketAddr, rtcp: SocketAddr) {
        *self.remote.lock() = Some((rtp, rtcp));
    }

    pub fn local_rtp_port(&self) -> u16 {
        self.local_rtp_port
    }

    pub fn local_rtcp_port(&self) -> u16 {
        self.local_rtcp_port
    }
}

impl RtpTransport for UdpTransport {
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
        let remote = self.remote.lock();
        let (_, rtcp_addr) = remote.ok_or_else(|| {
            RtspError::TransportUnreachable("RTCP remote address not yet known".into())
        })?;
        self.rtcp_socket.send_to(payload, rtcp_addr)?;
        Ok(())
    }

    fn client_descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::Udp {
            rtp_port: self.local_rtp_port,
            rtcp_port: self.local_rtcp_port,
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
                    tracing::debug!(error = %e, "UDP transport read error");
                    break;
                }
            }
        }
    });
}

/// Resolve a `SocketAddr` pair from a server's reported RTP address and
/// `server_port=a-b`.
pub fn resolve_remote(host: IpAddr, rtp_port: u16, rtcp_port: u16) -> (SocketAddr, SocketAddr) {
    (SocketAddr::new(host, rtp_port), SocketAddr::new(host, rtcp_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_consecutive_even_odd_pair() {
        let transport = UdpTransport::bind_port_pair(20000..=20100).unwrap();
        assert_eq!(transport.local_rtp_port() % 2, 0);
        assert_eq!(transport.local_rtcp_port(), transport.local_rtp_port() + 1);
    }

    #[test]
    fn write_control_without_remote_errors() {
        let transport = UdpTransport::bind_port_pair(20200..=20300).unwrap();
        assert!(transport.write_control(b"x").is_err());
    }

    #[test]
    fn client_descriptor_reports_local_ports() {
        let transport = UdpTransport::bind_port_pair(20400..=20500).unwrap();
        match transport.client_descriptor() {
            TransportDescriptor::Udp { rtp_port, rtcp_port } => {
                assert_eq!(rtp_port, transport.local_rtp_port());
                assert_eq!(rtcp_port, transport.local_rtcp_port());
            }
            other => panic!("expected Udp descriptor, got {other:?}"),
        }
    }
}

//! TCP-interleaved RTP/RTCP transport (`RTP/AVP/TCP`, RFC 2326 §10.12).
//!
//! RTP and RTCP travel as `$`-framed chunks on the same TCP connection as
//! RTSP signaling (see [`crate::listener`]), each tagged with a one-byte
//! channel number the `SETUP` response's `Transport: ...;interleaved=a-b`
//! assigns. This transport has no socket of its own — it's backed by the
//! listener's shared data-frame channel, filtered by channel number.
//!
//! The teacher's server explicitly rejected this transport
//! (`protocol::handler::handle_setup` returned `461 Unsupported Transport`
//! for `RTP/AVP/TCP`); a client has to support it, since many cameras
//! behind NAT or a restrictive firewall offer only this mode.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use super::{ReceivedPacket, RtpTransport, TransportDescriptor};
use crate::listener::Listener;
use crate::Result;

pub struct InterleavedTransport {
    listener: Arc<Listener>,
    rtp_channel: u8,
    rtcp_channel: u8,
    frames: Option<mpsc::Receiver<crate::protocol::DataFrame>>,
}

impl InterleavedTransport {
    /// Construct a transport for one track's channel pair, plus the
    /// [`mpsc::Sender`] a caller's central frame pump should forward
    /// matching `DataFrame`s into.
    ///
    /// One TCP connection has exactly one interleaved byte stream but may
    /// carry several tracks' channels; [`Listener::spawn`] hands back a
    /// single data-frame receiver for the whole connection, so something
    /// has to demultiplex it by channel number before each track's
    /// transport sees its own frames. That demultiplexing is the caller's
    /// job (the client state machine owns the listener's one receiver);
    /// this type only needs a private per-track receiver end.
    pub fn channel(
        listener: Arc<Listener>,
        rtp_channel: u8,
        rtcp_channel: u8,
    ) -> (mpsc::Sender<crate::protocol::DataFrame>, Self) {
        let (tx, rx) = mpsc::channel();
        (
            tx,
            Self {
                listener,
                rtp_channel,
                rtcp_channel,
                frames: Some(rx),
            },
        )
    }
}

impl RtpTransport for InterleavedTransport {
    fn start(&mut self) -> Result<(mpsc::Receiver<ReceivedPacket>, mpsc::Receiver<ReceivedPacket>)> {
        let (rtp_tx, rtp_rx) = mpsc::channel();
        let (rtcp_tx, rtcp_rx) = mpsc::channel();
        let frames = self
            .frames
            .take()
            .expect("InterleavedTransport::start called more than once");
        let rtp_channel = self.rtp_channel;
        let rtcp_channel = self.rtcp_channel;

        thread::spawn(move || {
            for frame in frames {
                let routed = if frame.channel == rtp_channel {
                    rtp_tx.send(ReceivedPacket { payload: frame.payload })
                } else if frame.channel == rtcp_channel {
                    rtcp_tx.send(ReceivedPacket { payload: frame.payload })
                } else {
                    tracing::trace!(channel = frame.channel, "dropping frame for unrecognized interleaved channel");
                    continue;
                };
                if routed.is_err() {
                    break;
                }
            }
        });

        Ok((rtp_rx, rtcp_rx))
    }

    fn stop(&mut self) {
        // The demux thread exits on its own once the listener's data
        // channel closes (connection teardown); nothing to do here.
    }

    fn write_control(&self, payload: &[u8]) -> Result<()> {
        self.listener.send_data(self.rtcp_channel, payload)
    }

    fn client_descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::Interleaved {
            rtp_channel: self.rtp_channel,
            rtcp_channel: self.rtcp_channel,
        }
    }
}

//! Media codecs and RTP depayloading.
//!
//! This module provides the [`Depayloader`] trait and codec-specific
//! implementations that turn received RTP packets back into encoded access
//! units ([`Frame`]s). This is the mirror image of the teacher's
//! `Packetizer` trait, which split encoded frames *into* RTP packets for a
//! publishing server; a client receives media, so the data flow here runs
//! the other way.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded frame may arrive as one or more RTP packets. Every RTP
//! packet carries a 12-byte fixed header ([`rtp::RtpPacket`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping) — for reordering and loss detection.
//! - **Timestamp** (32-bit) — media clock, typically 90 kHz for video.
//! - **SSRC** (32-bit) — identifies the sender.
//! - **Marker bit** — set on the last packet of an access unit (frame).
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) |
//! | H.265 | [`h265`] | [RFC 7798](https://tools.ietf.org/html/rfc7798) |
//! | MJPEG | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) |
//! | MPEG2-TS | [`mp2t`] | [RFC 2250](https://tools.ietf.org/html/rfc2250) |
//! | G.711 | [`g711`] | [RFC 3551](https://tools.ietf.org/html/rfc3551) |
//! | AAC | [`aac`] | [RFC 3640](https://tools.ietf.org/html/rfc3640) |
//! | AMR | [`amr`] | [RFC 4867](https://tools.ietf.org/html/rfc4867) |

pub mod aac;
pub mod amr;
pub mod g711;
pub mod h264;
pub mod h265;
pub mod mjpeg;
pub mod mp2t;
pub mod rtcp;
pub mod rtp;

use smallvec::SmallVec;

use crate::Result;

/// One reassembled access unit, ready for a decoder.
///
/// Frames are scatter-gather: most depayloaders emit a single contiguous
/// payload, but FU-A/FU reassembly and MJPEG fragment reassembly both
/// naturally produce a handful of byte ranges rather than one allocation.
/// `SmallVec` keeps the common 1-2 fragment case off the heap, the same
/// tradeoff `moonfire-rtsp` makes for its own packet bookkeeping.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RTP timestamp of the packet(s) this frame was reassembled from
    /// (media clock units, see [`Depayloader::clock_rate`]).
    pub rtp_timestamp: u32,
    /// Wall-clock time derived from the most recent RTCP Sender Report, if
    /// one has been received yet (spec.md §4.7).
    pub wall_clock: Option<f64>,
    pub data: SmallVec<[Vec<u8>; 2]>,
}

impl Frame {
    pub fn single(rtp_timestamp: u32, data: Vec<u8>) -> Self {
        let mut parts = SmallVec::new();
        parts.push(data);
        Self {
            rtp_timestamp,
            wall_clock: None,
            data: parts,
        }
    }

    /// Total byte length across all fragments.
    pub fn len(&self) -> usize {
        self.data.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy all fragments into one contiguous buffer.
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for part in &self.data {
            out.extend_from_slice(part);
        }
        out
    }
}

/// Codec-specific RTP depayloader.
///
/// Each supported codec implements this trait. A depayloader is fed packets
/// in the order the transport layer delivers them (already reordered within
/// whatever jitter tolerance the transport provides) and emits zero or more
/// complete [`Frame`]s — zero while a fragmented access unit is still being
/// assembled, more than one if a single RTP packet happens to complete a
/// pending frame and also starts immediately yielding metadata (rare, but
/// the signature allows it rather than special-casing).
///
/// ## Implementing a new codec
///
/// 1. Create a new module (e.g. `media/my_codec.rs`).
/// 2. Implement `Depayloader` for your type, constructed from the relevant
///    `a=rtpmap`/`a=fmtp` attributes ([`crate::protocol::sdp::Media`]).
/// 3. Wire it into [`crate::client::Client`]'s per-track dispatch.
pub trait Depayloader: Send {
    /// Consume one RTP packet, returning any access units it completed.
    fn push(&mut self, packet: &rtp::RtpPacket<'_>) -> Result<Vec<Frame>>;

    /// Codec name as it appears in the `a=rtpmap` attribute (e.g. `"H264"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz (RFC 3551 §4).
    fn clock_rate(&self) -> u32;

    /// Discard any in-flight reassembly state. Called after a
    /// [`rtp::SequenceTracker`] reports a discontinuity, since a partial
    /// fragmented access unit can never be completed correctly once a
    /// fragment has gone missing (spec.md §4.5/§8 invariant 6's scope).
    fn reset(&mut self);
}

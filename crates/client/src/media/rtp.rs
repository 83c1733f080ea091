//! RTP fixed header parsing (RFC 3550 §5.1).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            contributing source (CSRC) identifiers ...         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! This is the read path: a client only ever receives RTP packets, never
//! builds them, so unlike the teacher's `RtpHeader` (a write-only header
//! state machine for a publishing server) this is a borrowed, zero-copy
//! view over a received datagram or depacketized interleaved frame.

use crate::error::{ParseErrorKind, RtspError};
use crate::Result;

/// Minimum length of a fixed RTP header with no CSRC list (RFC 3550 §5.1).
const FIXED_HEADER_LEN: usize = 12;

/// A parsed RTP packet, borrowing its payload from the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    /// Present if `extension` is set: `(profile, data)`.
    pub extension_header: Option<(u16, &'a [u8])>,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse an RTP packet from a UDP datagram or de-interleaved frame
    /// payload. Fails if the buffer is shorter than the fixed header plus
    /// its declared CSRC list, or if an extension header's declared length
    /// overruns the buffer.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(RtspError::ProtocolViolation(format!(
                "RTP packet too short: {} bytes",
                buf.len()
            )));
        }

        let version = buf[0] >> 6;
        let padding = (buf[0] & 0x20) != 0;
        let extension = (buf[0] & 0x10) != 0;
        let cc = buf[0] & 0x0f;
        let marker = (buf[1] & 0x80) != 0;
        let payload_type = buf[1] & 0x7f;
        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let mut offset = FIXED_HEADER_LEN;
        let csrc_len = cc as usize * 4;
        if buf.len() < offset + csrc_len {
            return Err(RtspError::ProtocolViolation(
                "RTP packet truncated in CSRC list".into(),
            ));
        }
        let csrc = buf[offset..offset + csrc_len]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        offset += csrc_len;

        let extension_header = if extension {
            if buf.len() < offset + 4 {
                return Err(RtspError::ProtocolViolation(
                    "RTP packet truncated in extension header".into(),
                ));
            }
            let profile = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let ext_words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            let ext_len = ext_words * 4;
            offset += 4;
            if buf.len() < offset + ext_len {
                return Err(RtspError::ProtocolViolation(
                    "RTP packet truncated in extension data".into(),
                ));
            }
            let data = &buf[offset..offset + ext_len];
            offset += ext_len;
            Some((profile, data))
        } else {
            None
        };

        let mut payload = &buf[offset..];
        if padding {
            let pad_len = *payload.last().ok_or(RtspError::Parse {
                kind: ParseErrorKind::TruncatedInterleavedFrame,
            })? as usize;
            if pad_len == 0 || pad_len > payload.len() {
                return Err(RtspError::ProtocolViolation(
                    "RTP packet padding length exceeds payload".into(),
                ));
            }
            payload = &payload[..payload.len() - pad_len];
        }

        Ok(RtpPacket {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_header,
            payload,
        })
    }
}

/// Tracks RTP sequence-number continuity across a stream of packets for one
/// SSRC, used by depayloaders to decide whether a fragmented reassembly is
/// still intact.
///
/// A single 16-bit wraparound (`0xFFFF` -> `0x0000`) is normal stream
/// progress, not a discontinuity. Anything else that isn't exactly "next
/// packet" — a gap, a reorder, a restart — is reported as a discontinuity so
/// the caller can discard in-flight reassembly state rather than emit a
/// corrupt frame.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u16>,
}

/// Outcome of observing the next sequence number in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// First packet seen, or directly follows the previous one (with or
    /// without 16-bit wraparound).
    Continuous,
    /// A gap, reorder, or restart was observed.
    Discontinuity,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Observe the next packet's sequence number and classify it.
    pub fn observe(&mut self, sequence_number: u16) -> Continuity {
        let result = match self.last {
            None => Continuity::Continuous,
            Some(last) if last.wrapping_add(1) == sequence_number => Continuity::Continuous,
            Some(_) => Continuity::Discontinuity,
        };
        self.last = Some(sequence_number);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_packet(seq: u16, marker: bool, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0] = 2 << 6;
        buf[1] = ((marker as u8) << 7) | 96;
        buf[2..4].copy_from_slice(&seq.to_be_bytes());
        buf[4..8].copy_from_slice(&12345u32.to_be_bytes());
        buf[8..12].copy_from_slice(&0xAABBCCDDu32.to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn parses_fixed_header() {
        let buf = basic_packet(7, true, b"hello");
        let pkt = RtpPacket::parse(&buf).unwrap();
        assert_eq!(pkt.version, 2);
        assert!(pkt.marker);
        assert_eq!(pkt.payload_type, 96);
        assert_eq!(pkt.sequence_number, 7);
        assert_eq!(pkt.timestamp, 12345);
        assert_eq!(pkt.ssrc, 0xAABBCCDD);
        assert_eq!(pkt.payload, b"hello");
        assert!(pkt.csrc.is_empty());
        assert!(pkt.extension_header.is_none());
    }

    #[test]
    fn rejects_too_short_buffer() {
        assert!(RtpPacket::parse(&[0u8; 8]).is_err());
    }

    #[test]
    fn strips_padding() {
        let mut buf = basic_packet(1, false, b"data");
        buf[0] |= 0x20; // padding bit
        buf.extend_from_slice(&[0, 0, 3]); // 3 bytes of padding, last = pad_len
        let pkt = RtpPacket::parse(&buf).unwrap();
        assert_eq!(pkt.payload, b"data");
    }

    #[test]
    fn parses_csrc_list() {
        let mut buf = basic_packet(1, false, b"x");
        buf[0] = (2 << 6) | 2; // CC = 2
        let csrcs = [1u32, 2u32].iter().flat_map(|v| v.to_be_bytes()).collect::<Vec<_>>();
        buf.splice(12..12, csrcs);
        let pkt = RtpPacket::parse(&buf).unwrap();
        assert_eq!(pkt.csrc, vec![1, 2]);
        assert_eq!(pkt.payload, b"x");
    }

    #[test]
    fn sequence_tracker_wraparound_is_continuous() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(0xFFFE), Continuity::Continuous);
        assert_eq!(tracker.observe(0xFFFF), Continuity::Continuous);
        assert_eq!(tracker.observe(0x0000), Continuity::Continuous);
    }

    #[test]
    fn sequence_tracker_gap_is_discontinuity() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(10);
        assert_eq!(tracker.observe(15), Continuity::Discontinuity);
    }
}

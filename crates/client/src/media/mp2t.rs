//! MPEG2 Transport Stream RTP depayloader (RFC 2250 §2).
//!
//! The simplest payload format in this crate: the RTP payload is a whole
//! number of 188-byte TS packets back to back, no RTP-level framing of its
//! own (RFC 2250 §2 requires payloads be a multiple of the 188-byte packet
//! size). There is no access-unit boundary at the RTP layer at all — TS
//! packet boundaries are for the MPEG-TS demuxer downstream, not this
//! depayloader — so every packet is passed through as its own [`Frame`]
//! rather than waiting for a marker bit that payload type never sets
//! meaningfully for TS (RFC 2250 §2 marks it reserved, always 0).

use super::rtp::RtpPacket;
use super::{Depayloader, Frame};
use crate::error::RtspError;
use crate::Result;

const TS_PACKET_LEN: usize = 188;

#[derive(Debug, Default)]
pub struct Mp2tDepayloader;

impl Mp2tDepayloader {
    pub fn new() -> Self {
        Self
    }
}

impl Depayloader for Mp2tDepayloader {
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Vec<Frame>> {
        if packet.payload.is_empty() {
            return Ok(Vec::new());
        }
        if packet.payload.len() % TS_PACKET_LEN != 0 {
            return Err(RtspError::ProtocolViolation(format!(
                "MP2T payload length {} is not a multiple of {TS_PACKET_LEN}",
                packet.payload.len()
            )));
        }
        Ok(vec![Frame::single(packet.timestamp, packet.payload.to_vec())])
    }

    fn codec_name(&self) -> &'static str {
        "MP2T"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(payload: &[u8]) -> RtpPacket<'_> {
        RtpPacket {
            version: 2,
            padding: false,
            extension: false,
            marker: false,
            payload_type: 33,
            sequence_number: 1,
            timestamp: 0,
            ssrc: 1,
            csrc: Vec::new(),
            extension_header: None,
            payload,
        }
    }

    #[test]
    fn passes_through_whole_ts_packets() {
        let mut d = Mp2tDepayloader::new();
        let payload = vec![0x47u8; TS_PACKET_LEN * 2];
        let frames = d.push(&packet(&payload)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), TS_PACKET_LEN * 2);
    }

    #[test]
    fn rejects_non_multiple_length() {
        let mut d = Mp2tDepayloader::new();
        let payload = vec![0x47u8; TS_PACKET_LEN + 10];
        assert!(d.push(&packet(&payload)).is_err());
    }

    #[test]
    fn empty_payload_yields_no_frame() {
        let mut d = Mp2tDepayloader::new();
        let frames = d.push(&packet(&[])).unwrap();
        assert!(frames.is_empty());
    }
}

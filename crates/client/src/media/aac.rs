//! AAC RTP depayloader — MPEG4-GENERIC (RFC 3640 §3.2.1), AAC-hbr mode.
//!
//! Unlike the other codecs in this crate, one RTP packet may carry several
//! complete access units back to back (RFC 3640 calls this "aggregation").
//! The payload starts with an AU Header Section: a 16-bit bit-count
//! (`AU-headers-length`) followed by that many bits of AU headers, each
//! `sizelength + indexlength` (first header) or `sizelength +
//! indexdeltalength` (subsequent headers) bits wide. The AU Data Section
//! that follows is the concatenation of all AUs back to back, each exactly
//! as long as its header's declared size.
//!
//! `sizelength`/`indexlength`/`indexdeltalength` come from the SDP fmtp
//! attribute (e.g. `mode=AAC-hbr;sizelength=13;indexlength=3;
//! indexdeltalength=3`), the configuration essentially every IP camera and
//! NVR emitting AAC audio uses.

use super::rtp::RtpPacket;
use super::{Depayloader, Frame};
use crate::error::RtspError;
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct AacConfig {
    pub size_length: u8,
    pub index_length: u8,
    pub index_delta_length: u8,
}

impl Default for AacConfig {
    /// The values essentially every camera sends for AAC-hbr.
    fn default() -> Self {
        Self {
            size_length: 13,
            index_length: 3,
            index_delta_length: 3,
        }
    }
}

impl AacConfig {
    /// Parse `sizelength=N;indexlength=N;indexdeltalength=N` out of an fmtp
    /// parameter list (as produced by [`crate::protocol::sdp::Fmtp`]).
    pub fn from_fmtp(fmtp: &crate::protocol::sdp::Fmtp) -> Self {
        let mut config = Self::default();
        if let Some(v) = fmtp.get("sizelength").and_then(|v| v.parse().ok()) {
            config.size_length = v;
        }
        if let Some(v) = fmtp.get("indexlength").and_then(|v| v.parse().ok()) {
            config.index_length = v;
        }
        if let Some(v) = fmtp.get("indexdeltalength").and_then(|v| v.parse().ok()) {
            config.index_delta_length = v;
        }
        config
    }
}

#[derive(Debug)]
pub struct AacDepayloader {
    config: AacConfig,
}

impl AacDepayloader {
    pub fn new(config: AacConfig) -> Self {
        Self { config }
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read(&mut self, bits: u8) -> Option<u32> {
        if bits == 0 {
            return Some(0);
        }
        let mut value: u32 = 0;
        for _ in 0..bits {
            let byte = self.bit_pos / 8;
            if byte >= self.data.len() {
                return None;
            }
            let bit = 7 - (self.bit_pos % 8);
            let set = (self.data[byte] >> bit) & 1;
            value = (value << 1) | set as u32;
            self.bit_pos += 1;
        }
        Some(value)
    }
}

impl Depayloader for AacDepayloader {
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Vec<Frame>> {
        let payload = packet.payload;
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if payload.len() < 2 {
            return Err(RtspError::ProtocolViolation("AAC payload too short for AU header length".into()));
        }
        let au_headers_length_bits = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        let au_headers_bytes = au_headers_length_bits.div_ceil(8);
        if payload.len() < 2 + au_headers_bytes {
            return Err(RtspError::ProtocolViolation("AAC AU header section truncated".into()));
        }

        let mut header_reader = BitReader::new(&payload[2..2 + au_headers_bytes]);
        let mut sizes = Vec::new();
        let mut consumed_bits = 0usize;
        let mut first = true;
        while consumed_bits < au_headers_length_bits {
            let size = header_reader
                .read(self.config.size_length)
                .ok_or_else(|| RtspError::ProtocolViolation("AAC AU size field truncated".into()))?;
            let index_bits = if first {
                self.config.index_length
            } else {
                self.config.index_delta_length
            };
            header_reader
                .read(index_bits)
                .ok_or_else(|| RtspError::ProtocolViolation("AAC AU index field truncated".into()))?;
            consumed_bits += self.config.size_length as usize + index_bits as usize;
            sizes.push(size as usize);
            first = false;
        }

        let mut offset = 2 + au_headers_bytes;
        let mut frames = Vec::with_capacity(sizes.len());
        for size in sizes {
            if payload.len() < offset + size {
                return Err(RtspError::ProtocolViolation("AAC AU data truncated".into()));
            }
            frames.push(Frame::single(packet.timestamp, payload[offset..offset + size].to_vec()));
            offset += size;
        }
        Ok(frames)
    }

    fn codec_name(&self) -> &'static str {
        "MPEG4-GENERIC"
    }

    /// Caller overrides per the SDP `a=rtpmap` clock rate (AAC sample rate
    /// varies); 44100 is a common default absent other information.
    fn clock_rate(&self) -> u32 {
        44100
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
            marker: true,
            payload_type: 97,
            sequence_number: 1,
            timestamp: 1024,
            ssrc: 1,
            csrc: Vec::new(),
            extension_header: None,
            payload,
        }
    }

    #[test]
    fn single_au_extracted() {
        let mut d = AacDepayloader::new(AacConfig::default());
        let au_data = [0xAAu8, 0xBB, 0xCC, 0xDD];
        // 16 bits of header: size=13 bits (value=4), index=3 bits (value=0)
        let mut header: u32 = (4u32 << 3) | 0;
        header <<= 16 - 16; // already 16 bits wide (13+3)
        let header_bytes = (header as u16).to_be_bytes();
        let mut payload = vec![0, 16]; // AU-headers-length = 16 bits
        payload.extend_from_slice(&header_bytes);
        payload.extend_from_slice(&au_data);

        let frames = d.push(&packet(&payload)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_contiguous(), au_data.to_vec());
    }

    #[test]
    fn config_parsed_from_fmtp() {
        let fmtp = crate::protocol::sdp::Fmtp {
            payload_type: 97,
            parameters: vec![
                ("sizelength".into(), "13".into()),
                ("indexlength".into(), "3".into()),
                ("indexdeltalength".into(), "3".into()),
            ],
        };
        let config = AacConfig::from_fmtp(&fmtp);
        assert_eq!(config.size_length, 13);
        assert_eq!(config.index_length, 3);
    }

    #[test]
    fn rejects_truncated_header_section() {
        let mut d = AacDepayloader::new(AacConfig::default());
        assert!(d.push(&packet(&[0, 100])).is_err());
    }

    #[test]
    fn empty_payload_yields_no_frame() {
        let mut d = AacDepayloader::new(AacConfig::default());
        let frames = d.push(&packet(&[])).unwrap();
        assert!(frames.is_empty());
    }
}

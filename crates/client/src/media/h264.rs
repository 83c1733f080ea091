//! H.264 RTP depayloader (RFC 6184).
//!
//! Reassembles Annex B access units from RTP packets. Supports the two
//! packetization modes a live camera actually uses:
//!
//! - **Single NAL Unit** (§5.6): the RTP payload *is* one NAL unit; emit it
//!   with a start code prepended.
//! - **FU-A fragmentation** (§5.8): a NAL unit split across several RTP
//!   packets, each carrying a 2-byte FU header before the fragment data:
//!
//!   ```text
//!   FU indicator:  [F|NRI|Type=28]     (1 byte)
//!   FU header:     [S|E|R|Type]        (1 byte)
//!   Fragment data: [...]
//!   ```
//!
//!   The first fragment's FU header has `S=1` and reconstitutes the
//!   original NAL header byte (`F|NRI` from the indicator, `Type` from the
//!   FU header); the last has `E=1`. This is the direct inverse of the
//!   teacher's `H264Packetizer::packetize_nal` fragmentation logic.
//! - **STAP-A** (§5.7.1): several small NAL units aggregated into one RTP
//!   packet, each prefixed with a 2-byte big-endian size.
//!
//! An access unit (frame) ends at the RTP marker bit, per RFC 6184 §5.1 —
//! the same convention the teacher's packetizer used to *set* that bit.

use base64::prelude::{Engine as _, BASE64_STANDARD};

use super::rtp::RtpPacket;
use super::{Depayloader, Frame};
use crate::error::RtspError;
use crate::Result;

const NAL_TYPE_STAP_A: u8 = 24;
const NAL_TYPE_FU_A: u8 = 28;
const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 depayloader. Construct with SPS/PPS pulled from the SDP
/// `sprop-parameter-sets` fmtp parameter, if present, so the decoder can be
/// initialized before the first in-band SPS/PPS NAL (if the stream ever
/// sends one at all — many cameras only send them in the SDP).
#[derive(Debug)]
pub struct H264Depayloader {
    pending: Vec<u8>,
    fu_in_progress: bool,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl H264Depayloader {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            fu_in_progress: false,
            sps: None,
            pps: None,
        }
    }

    /// Parse the `sprop-parameter-sets=<base64-sps>,<base64-pps>` fmtp
    /// parameter (RFC 6184 §8.1).
    pub fn with_sprop_parameter_sets(mut self, sprop: &str) -> Self {
        let mut sets = sprop.split(',');
        if let Some(sps) = sets.next().and_then(|s| BASE64_STANDARD.decode(s).ok()) {
            self.sps = Some(sps);
        }
        if let Some(pps) = sets.next().and_then(|s| BASE64_STANDARD.decode(s).ok()) {
            self.pps = Some(pps);
        }
        self
    }

    /// SPS/PPS known so far, in the form a decoder expects: Annex B NAL
    /// units with start codes, SPS first.
    pub fn parameter_sets(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(sps) = &self.sps {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(sps);
        }
        if let Some(pps) = &self.pps {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(pps);
        }
        out
    }

    fn capture_parameter_set(&mut self, nal: &[u8]) {
        if nal.is_empty() {
            return;
        }
        match nal[0] & 0x1f {
            7 => self.sps = Some(nal.to_vec()),
            8 => self.pps = Some(nal.to_vec()),
            _ => {}
        }
    }

    fn emit_single_nal(&mut self, nal: &[u8]) {
        self.capture_parameter_set(nal);
        self.pending.extend_from_slice(&START_CODE);
        self.pending.extend_from_slice(nal);
    }
}

impl Default for H264Depayloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Depayloader for H264Depayloader {
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Vec<Frame>> {
        let payload = packet.payload;
        if payload.is_empty() {
            return Ok(Vec::new());
        }

        let nal_type = payload[0] & 0x1f;
        match nal_type {
            1..=23 => self.emit_single_nal(payload),
            NAL_TYPE_STAP_A => {
                let mut offset = 1; // skip STAP-A header byte
                while offset + 2 <= payload.len() {
                    let size = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
                    offset += 2;
                    if offset + size > payload.len() {
                        return Err(RtspError::ProtocolViolation(
                            "STAP-A aggregation unit overruns packet".into(),
                        ));
                    }
                    self.emit_single_nal(&payload[offset..offset + size]);
                    offset += size;
                }
            }
            NAL_TYPE_FU_A => {
                if payload.len() < 2 {
                    return Err(RtspError::ProtocolViolation("FU-A packet too short".into()));
                }
                let fu_indicator = payload[0];
                let fu_header = payload[1];
                let start = fu_header & 0x80 != 0;
                let end = fu_header & 0x40 != 0;
                let original_nal_type = fu_header & 0x1f;
                let fragment = &payload[2..];

                if start {
                    let reconstructed_header = (fu_indicator & 0x60) | original_nal_type;
                    self.pending.extend_from_slice(&START_CODE);
                    self.pending.push(reconstructed_header);
                    self.pending.extend_from_slice(fragment);
                    self.fu_in_progress = true;
                } else if self.fu_in_progress {
                    self.pending.extend_from_slice(fragment);
                } else {
                    // A middle/end fragment with no preceding start fragment: the
                    // reassembly is unrecoverable for this access unit.
                    return Ok(Vec::new());
                }

                if end {
                    self.fu_in_progress = false;
                    if let Some(nal_start) = self.pending.len().checked_sub(fragment.len() + 1) {
                        self.capture_parameter_set(&self.pending[nal_start..]);
                    }
                }
            }
            _ => {
                tracing::debug!(nal_type, "ignoring unsupported H.264 NAL unit type");
            }
        }

        if packet.marker && !self.fu_in_progress {
            let data = std::mem::take(&mut self.pending);
            if data.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![Frame::single(packet.timestamp, data)]);
        }

        Ok(Vec::new())
    }

    fn codec_name(&self) -> &'static str {
        "H264"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.fu_in_progress = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet<'a>(payload: &'a [u8], marker: bool, seq: u16, ts: u32) -> RtpPacket<'a> {
        RtpPacket {
            version: 2,
            padding: false,
            extension: false,
            marker,
            payload_type: 96,
            sequence_number: seq,
            timestamp: ts,
            ssrc: 1,
            csrc: Vec::new(),
            extension_header: None,
            payload,
        }
    }

    #[test]
    fn single_nal_with_marker_emits_frame() {
        let mut d = H264Depayloader::new();
        let nal = [0x65u8, 0xAA, 0xBB];
        let frames = d.push(&packet(&nal, true, 1, 1000)).unwrap();
        assert_eq!(frames.len(), 1);
        let data = frames[0].to_contiguous();
        assert_eq!(&data[..4], &START_CODE);
        assert_eq!(&data[4..], &nal);
    }

    #[test]
    fn fu_a_reassembles_across_fragments() {
        let mut d = H264Depayloader::new();
        let nal_header = 0x65u8; // F=0 NRI=3 Type=5 (slice)
        let fu_indicator = (nal_header & 0x60) | NAL_TYPE_FU_A;

        let start_fu = [fu_indicator, 0x80 | (nal_header & 0x1f), 0xAA, 0xBB];
        let mid_fu = [fu_indicator, nal_header & 0x1f, 0xCC, 0xDD];
        let end_fu = [fu_indicator, 0x40 | (nal_header & 0x1f), 0xEE];

        assert!(d.push(&packet(&start_fu, false, 1, 5000)).unwrap().is_empty());
        assert!(d.push(&packet(&mid_fu, false, 2, 5000)).unwrap().is_empty());
        let frames = d.push(&packet(&end_fu, true, 3, 5000)).unwrap();

        assert_eq!(frames.len(), 1);
        let data = frames[0].to_contiguous();
        assert_eq!(&data[..4], &START_CODE);
        assert_eq!(data[4], nal_header);
        assert_eq!(&data[5..], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
    }

    #[test]
    fn stap_a_splits_into_multiple_nals() {
        let mut d = H264Depayloader::new();
        let nal_a = [0x67u8, 0x42, 0x00];
        let nal_b = [0x68u8, 0xCE];
        let mut payload = vec![NAL_TYPE_STAP_A];
        payload.extend_from_slice(&(nal_a.len() as u16).to_be_bytes());
        payload.extend_from_slice(&nal_a);
        payload.extend_from_slice(&(nal_b.len() as u16).to_be_bytes());
        payload.extend_from_slice(&nal_b);

        let frames = d.push(&packet(&payload, true, 1, 1000)).unwrap();
        assert_eq!(frames.len(), 1);
        let data = frames[0].to_contiguous();
        assert_eq!(data.len(), 4 + nal_a.len() + 4 + nal_b.len());
    }

    #[test]
    fn reset_clears_partial_fu_a_state() {
        let mut d = H264Depayloader::new();
        let fu_indicator = NAL_TYPE_FU_A;
        let start_fu = [fu_indicator, 0x80 | 5, 0xAA];
        d.push(&packet(&start_fu, false, 1, 1)).unwrap();
        assert!(d.fu_in_progress);
        d.reset();
        assert!(!d.fu_in_progress);
        assert!(d.pending.is_empty());
    }

    #[test]
    fn sprop_parameter_sets_decoded() {
        let sps = BASE64_STANDARD.encode([0x67, 0x42, 0x00, 0x1e]);
        let pps = BASE64_STANDARD.encode([0x68, 0xCE, 0x38, 0x80]);
        let d = H264Depayloader::new().with_sprop_parameter_sets(&format!("{sps},{pps}"));
        let sets = d.parameter_sets();
        assert!(sets.len() > 8);
    }
}

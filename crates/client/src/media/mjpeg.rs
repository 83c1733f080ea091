//! MJPEG RTP depayloader (RFC 2435).
//!
//! Simpler than H.264/H.265 — there's no NAL-unit concept, just a single
//! JPEG frame split across RTP packets by byte offset:
//!
//! ```text
//! Type-specific (1 byte) | Fragment Offset (3 bytes)
//! Type (1 byte) | Q (1 byte) | Width (1 byte, /8) | Height (1 byte, /8)
//! [Restart Marker header (4 bytes), if Type is 64..=127]
//! [Quantization Table header + tables, if Q >= 128 and Fragment Offset == 0]
//! JPEG scan data...
//! ```
//!
//! RFC 2435 payloads never carry JPEG headers (SOI, DQT, SOF, DHT, SOS) —
//! only entropy-coded scan data. A decodable JPEG file has to be
//! synthesized around each reassembled frame: quantization tables either
//! arrive in-band (`Q >= 128`) or are derived from `Q` via the scaling
//! formula in RFC 2435 §4.2/Appendix A; Huffman tables are always the
//! standard ITU-T Annex K tables, since RFC 2435 never transmits custom
//! ones (§4.2, last paragraph). Static payload type 26:
//! `a=rtpmap:26 JPEG/90000`.

use super::rtp::RtpPacket;
use super::{Depayloader, Frame};
use crate::error::RtspError;
use crate::Result;

#[derive(Debug)]
pub struct MjpegDepayloader {
    pending: Vec<u8>,
    restart_interval: Option<u16>,
    width_px: u16,
    height_px: u16,
    qtables: Option<(u8, Vec<u8>)>,
    in_progress: bool,
}

impl MjpegDepayloader {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            restart_interval: None,
            width_px: 0,
            height_px: 0,
            qtables: None,
            in_progress: false,
        }
    }
}

impl Default for MjpegDepayloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Depayloader for MjpegDepayloader {
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Vec<Frame>> {
        let payload = packet.payload;
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if payload.len() < 8 {
            return Err(RtspError::ProtocolViolation("JPEG RTP header too short".into()));
        }

        let type_specific = payload[0];
        let fragment_offset = ((payload[1] as u32) << 16) | ((payload[2] as u32) << 8) | payload[3] as u32;
        let jpeg_type = payload[4];
        let q = payload[5];
        let width_blocks = payload[6];
        let height_blocks = payload[7];
        let mut offset = 8;

        if (64..=127).contains(&jpeg_type) {
            if payload.len() < offset + 4 {
                return Err(RtspError::ProtocolViolation("restart marker header truncated".into()));
            }
            let restart_interval = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
            self.restart_interval = Some(restart_interval);
            offset += 4;
        }

        if fragment_offset == 0 {
            self.pending.clear();
            self.in_progress = true;
            self.width_px = width_blocks as u16 * 8;
            self.height_px = height_blocks as u16 * 8;

            if q >= 128 {
                if payload.len() < offset + 4 {
                    return Err(RtspError::ProtocolViolation(
                        "quantization table header truncated".into(),
                    ));
                }
                let precision = payload[offset];
                let length = u16::from_be_bytes([payload[offset + 1], payload[offset + 2]]) as usize;
                offset += 4;
                if payload.len() < offset + length {
                    return Err(RtspError::ProtocolViolation("quantization tables truncated".into()));
                }
                self.qtables = Some((precision, payload[offset..offset + length].to_vec()));
                offset += length;
            } else {
                self.qtables = Some((0, derive_quant_tables(q)));
            }

            let _ = type_specific; // reserved, not interpreted per RFC 2435 §3.1.1
            let _ = jpeg_type;
        }

        if !self.in_progress {
            return Ok(Vec::new());
        }

        self.pending.extend_from_slice(&payload[offset..]);

        if packet.marker {
            self.in_progress = false;
            let qtables = self.qtables.take().unwrap_or_default();
            let scan = std::mem::take(&mut self.pending);
            let jpeg = synthesize_jpeg(self.width_px, self.height_px, &qtables.1, &scan);
            return Ok(vec![Frame::single(packet.timestamp, jpeg)]);
        }

        Ok(Vec::new())
    }

    fn codec_name(&self) -> &'static str {
        "JPEG"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.in_progress = false;
    }
}

/// RFC 2435 Appendix A: the baseline luminance/chrominance quantization
/// tables scaled by `Q` (1..=99 mapped through the same nonlinear factor
/// libjpeg uses). Returns two concatenated 64-byte tables.
fn derive_quant_tables(q: u8) -> Vec<u8> {
    const LUMA: [u16; 64] = [
        16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69,
        56, 14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81,
        104, 113, 92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
    ];
    const CHROMA: [u16; 64] = [
        17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99,
        99, 47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
        99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    ];

    let factor = if q < 50 {
        5000 / q.max(1) as u32
    } else {
        200 - (q as u32) * 2
    };

    let scale = |table: &[u16; 64]| -> Vec<u8> {
        table
            .iter()
            .map(|&v| {
                let scaled = (v as u32 * factor + 50) / 100;
                scaled.clamp(1, 255) as u8
            })
            .collect()
    };

    let mut out = scale(&LUMA);
    out.extend(scale(&CHROMA));
    out
}

/// Build a minimal baseline JPEG file around reassembled scan data: SOI,
/// DQT (luma + chroma), SOF0, standard Huffman DHTs, SOS, scan data, EOI.
fn synthesize_jpeg(width: u16, height: u16, qtables: &[u8], scan: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(scan.len() + 256);
    out.extend_from_slice(&[0xFF, 0xD8]); // SOI

    let luma = qtables.get(..64).unwrap_or(&[16u8; 64]);
    let chroma = qtables.get(64..128).unwrap_or(&[17u8; 64]);
    write_dqt(&mut out, 0, luma);
    write_dqt(&mut out, 1, chroma);
    write_sof0(&mut out, width, height);
    write_standard_huffman_tables(&mut out);
    write_sos(&mut out);

    out.extend_from_slice(scan);
    out.extend_from_slice(&[0xFF, 0xD9]); // EOI
    out
}

fn write_dqt(out: &mut Vec<u8>, table_id: u8, table: &[u8]) {
    out.extend_from_slice(&[0xFF, 0xDB]);
    out.extend_from_slice(&((table.len() as u16) + 3).to_be_bytes());
    out.push(table_id);
    out.extend_from_slice(table);
}

fn write_sof0(out: &mut Vec<u8>, width: u16, height: u16) {
    out.extend_from_slice(&[0xFF, 0xC0]);
    out.extend_from_slice(&17u16.to_be_bytes());
    out.push(8); // sample precision
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.push(3); // components: Y, Cb, Cr
    out.extend_from_slice(&[1, 0x21, 0]); // Y: id=1, 2x1 sampling, qtable 0
    out.extend_from_slice(&[2, 0x11, 1]); // Cb: id=2, 1x1 sampling, qtable 1
    out.extend_from_slice(&[3, 0x11, 1]); // Cr: id=3, 1x1 sampling, qtable 1
}

fn write_sos(out: &mut Vec<u8>) {
    out.extend_from_slice(&[0xFF, 0xDA]);
    out.extend_from_slice(&12u16.to_be_bytes());
    out.push(3);
    out.extend_from_slice(&[1, 0x00]); // Y: DC table 0, AC table 0
    out.extend_from_slice(&[2, 0x11]); // Cb: DC table 1, AC table 1
    out.extend_from_slice(&[3, 0x11]); // Cr: DC table 1, AC table 1
    out.extend_from_slice(&[0, 63, 0]);
}

/// ITU-T T.81 Annex K standard Huffman tables, the only ones RFC 2435
/// payloads ever imply (custom Huffman tables are out of scope per §4.2).
fn write_standard_huffman_tables(out: &mut Vec<u8>) {
    write_dht(out, 0x00, &K3_DC_LUMA_BITS, &K3_DC_LUMA_VALS);
    write_dht(out, 0x10, &K3_AC_LUMA_BITS, &K3_AC_LUMA_VALS);
    write_dht(out, 0x01, &K3_DC_CHROMA_BITS, &K3_DC_CHROMA_VALS);
    write_dht(out, 0x11, &K3_AC_CHROMA_BITS, &K3_AC_CHROMA_VALS);
}

fn write_dht(out: &mut Vec<u8>, table_class_and_id: u8, bits: &[u8; 16], values: &[u8]) {
    out.extend_from_slice(&[0xFF, 0xC4]);
    let length = 2 + 1 + 16 + values.len();
    out.extend_from_slice(&(length as u16).to_be_bytes());
    out.push(table_class_and_id);
    out.extend_from_slice(bits);
    out.extend_from_slice(values);
}

const K3_DC_LUMA_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const K3_DC_LUMA_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const K3_DC_CHROMA_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const K3_DC_CHROMA_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const K3_AC_LUMA_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
#[rustfmt::skip]
const K3_AC_LUMA_VALS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];
const K3_AC_CHROMA_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
#[rustfmt::skip]
const K3_AC_CHROMA_VALS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn packet<'a>(payload: &'a [u8], marker: bool, seq: u16, ts: u32) -> RtpPacket<'a> {
        RtpPacket {
            version: 2,
            padding: false,
            extension: false,
            marker,
            payload_type: 26,
            sequence_number: seq,
            timestamp: ts,
            ssrc: 1,
            csrc: Vec::new(),
            extension_header: None,
            payload,
        }
    }

    fn single_fragment_header(q: u8) -> Vec<u8> {
        vec![0, 0, 0, 0, 1, q, 80, 60] // type=1 (420), width=640px, height=480px
    }

    #[test]
    fn single_fragment_produces_valid_jpeg_framing() {
        let mut d = MjpegDepayloader::new();
        let mut payload = single_fragment_header(50);
        payload.extend_from_slice(&[0xAB; 32]);
        let frames = d.push(&packet(&payload, true, 1, 0)).unwrap();
        assert_eq!(frames.len(), 1);
        let jpeg = frames[0].to_contiguous();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
        assert!(jpeg.windows(2).any(|w| w == [0xFF, 0xDB])); // DQT present
        assert!(jpeg.windows(2).any(|w| w == [0xFF, 0xC0])); // SOF0 present
        assert!(jpeg.windows(2).any(|w| w == [0xFF, 0xDA])); // SOS present
    }

    #[test]
    fn multi_fragment_reassembles_scan_data() {
        let mut d = MjpegDepayloader::new();
        let mut first = vec![0, 0, 0, 0, 1, 50, 80, 60];
        first.extend_from_slice(&[0x11, 0x22]);
        let mut second = vec![0, 0, 0, 2, 1, 50, 80, 60];
        second.extend_from_slice(&[0x33, 0x44]);

        assert!(d.push(&packet(&first, false, 1, 0)).unwrap().is_empty());
        let frames = d.push(&packet(&second, true, 2, 0)).unwrap();
        let jpeg = frames[0].to_contiguous();
        assert!(jpeg.windows(4).any(|w| w == [0x11, 0x22, 0x33, 0x44]));
    }

    #[test]
    fn in_band_quant_tables_used_verbatim() {
        let mut d = MjpegDepayloader::new();
        let mut payload = vec![0, 0, 0, 0, 1, 255, 80, 60];
        payload.extend_from_slice(&[0, 0, 128]); // precision=0, length=128
        payload.extend_from_slice(&[9u8; 128]);
        payload.extend_from_slice(&[0xAB; 16]);
        let frames = d.push(&packet(&payload, true, 1, 0)).unwrap();
        let jpeg = frames[0].to_contiguous();
        assert!(jpeg.windows(2).any(|w| w == [0xFF, 0xDB]));
    }

    #[test]
    fn rejects_short_header() {
        let mut d = MjpegDepayloader::new();
        assert!(d.push(&packet(&[0u8; 4], true, 1, 0)).is_err());
    }

    #[test]
    fn empty_payload_yields_no_frame() {
        let mut d = MjpegDepayloader::new();
        let frames = d.push(&packet(&[], true, 1, 0)).unwrap();
        assert!(frames.is_empty());
    }
}

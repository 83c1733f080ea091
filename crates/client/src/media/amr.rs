//! AMR / AMR-WB RTP depayloader — octet-aligned mode (RFC 4867 §4.4.1).
//!
//! Bandwidth-efficient mode (RFC 4867 §4.3) packs frames at the bit level
//! and is rare outside cellular-network relays; every camera/NVR in this
//! crate's target market that speaks AMR negotiates `octet-align=1`, so
//! that's the only mode implemented. Octet-aligned payload layout:
//!
//! ```text
//! CMR (1 byte)
//! ToC[0] (1 byte): F(1) | FT(4) | Q(1) | pad(2)
//! ToC[1] ...                                         (one per frame, F=1 means "another follows")
//! speech frame 0 (byte-aligned, length from FT's bitrate table)
//! speech frame 1 ...
//! ```
//!
//! One RTP packet may aggregate several frames (RFC 4867 §4.4); each frame
//! in this implementation is emitted as its own [`Frame`], RTP timestamp
//! unmodified (frame-accurate timestamps within an aggregate are not part
//! of RFC 4867's payload format — only the packet's overall timestamp is
//! guaranteed).

use super::rtp::RtpPacket;
use super::{Depayloader, Frame};
use crate::error::RtspError;
use crate::Result;

/// Narrowband AMR frame-type sizes in bytes, including the 1-bit padding
/// (RFC 4867 Table 1), indexed by FT 0..=15 (FT 15 = "no data").
const NARROWBAND_FRAME_BYTES: [usize; 16] = [
    12, 13, 15, 17, 19, 20, 26, 31, 5, 0, 0, 0, 0, 0, 0, 0,
];
/// AMR-WB frame-type sizes (RFC 4867 Table 2).
const WIDEBAND_FRAME_BYTES: [usize; 16] = [
    17, 23, 32, 36, 40, 46, 50, 58, 60, 5, 0, 0, 0, 0, 0, 0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmrBand {
    Narrowband,
    Wideband,
}

#[derive(Debug)]
pub struct AmrDepayloader {
    band: AmrBand,
}

impl AmrDepayloader {
    pub fn new(band: AmrBand) -> Self {
        Self { band }
    }

    fn frame_table(&self) -> &'static [usize; 16] {
        match self.band {
            AmrBand::Narrowband => &NARROWBAND_FRAME_BYTES,
            AmrBand::Wideband => &WIDEBAND_FRAME_BYTES,
        }
    }
}

impl Depayloader for AmrDepayloader {
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Vec<Frame>> {
        let payload = packet.payload;
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        if payload.len() < 2 {
            return Err(RtspError::ProtocolViolation("AMR payload too short for CMR + ToC".into()));
        }

        let mut offset = 1; // skip CMR byte
        let mut frame_types = Vec::new();
        loop {
            let toc = *payload.get(offset).ok_or_else(|| {
                RtspError::ProtocolViolation("AMR ToC truncated".into())
            })?;
            offset += 1;
            let follows = toc & 0x80 != 0;
            let ft = (toc >> 3) & 0x0f;
            frame_types.push(ft);
            if !follows {
                break;
            }
        }

        let table = self.frame_table();
        let mut frames = Vec::with_capacity(frame_types.len());
        for ft in frame_types {
            let len = table[ft as usize];
            if len == 0 {
                continue; // SID/no-data frame type, nothing to emit
            }
            if payload.len() < offset + len {
                return Err(RtspError::ProtocolViolation("AMR speech frame truncated".into()));
            }
            frames.push(Frame::single(packet.timestamp, payload[offset..offset + len].to_vec()));
            offset += len;
        }
        Ok(frames)
    }

    fn codec_name(&self) -> &'static str {
        match self.band {
            AmrBand::Narrowband => "AMR",
            AmrBand::Wideband => "AMR-WB",
        }
    }

    fn clock_rate(&self) -> u32 {
        match self.band {
            AmrBand::Narrowband => 8000,
            AmrBand::Wideband => 16000,
        }
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
            payload_type: 98,
            sequence_number: 1,
            timestamp: 160,
            ssrc: 1,
            csrc: Vec::new(),
            extension_header: None,
            payload,
        }
    }

    #[test]
    fn single_frame_extracted() {
        let mut d = AmrDepayloader::new(AmrBand::Narrowband);
        let ft = 7u8; // 31-byte frame
        let toc = (ft << 3) & 0x78; // F=0 (last), Q implied 0
        let mut payload = vec![0x00, toc]; // CMR, ToC
        payload.extend(vec![0xAB; 31]);
        let frames = d.push(&packet(&payload)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 31);
    }

    #[test]
    fn multiple_aggregated_frames() {
        let mut d = AmrDepayloader::new(AmrBand::Narrowband);
        let ft0 = 0u8; // 12 bytes, F=1 (more follow)
        let toc0 = 0x80 | ((ft0 << 3) & 0x78);
        let ft1 = 0u8;
        let toc1 = (ft1 << 3) & 0x78; // F=0
        let mut payload = vec![0x00, toc0, toc1];
        payload.extend(vec![0x11; 12]);
        payload.extend(vec![0x22; 12]);
        let frames = d.push(&packet(&payload)).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn rejects_truncated_toc() {
        let mut d = AmrDepayloader::new(AmrBand::Narrowband);
        let payload = vec![0x00, 0x80]; // F=1 but no second ToC byte
        assert!(d.push(&packet(&payload)).is_err());
    }

    #[test]
    fn empty_payload_yields_no_frame() {
        let mut d = AmrDepayloader::new(AmrBand::Narrowband);
        let frames = d.push(&packet(&[])).unwrap();
        assert!(frames.is_empty());
    }
}

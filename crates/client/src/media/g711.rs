//! G.711 (PCMU/PCMA) RTP depayloader (RFC 3551 §4.5.14).
//!
//! The simplest audio payload format: every RTP packet's payload is exactly
//! one access unit — a run of 8-bit mu-law (payload type 0) or A-law
//! (payload type 8) samples, passed straight to a decoder with no framing
//! of its own.

use super::rtp::RtpPacket;
use super::{Depayloader, Frame};
use crate::Result;

/// Static payload types this depayloader recognizes, per RFC 3551 §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711Variant {
    MuLaw,
    ALaw,
}

#[derive(Debug)]
pub struct G711Depayloader {
    variant: G711Variant,
}

impl G711Depayloader {
    pub fn new(variant: G711Variant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> G711Variant {
        self.variant
    }
}

impl Depayloader for G711Depayloader {
    fn push(&mut self, packet: &RtpPacket<'_>) -> Result<Vec<Frame>> {
        if packet.payload.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Frame::single(packet.timestamp, packet.payload.to_vec())])
    }

    fn codec_name(&self) -> &'static str {
        match self.variant {
            G711Variant::MuLaw => "PCMU",
            G711Variant::ALaw => "PCMA",
        }
    }

    /// 8 kHz per RFC 3551 §4.5.14.
    fn clock_rate(&self) -> u32 {
        8000
    }

    fn reset(&mut self) {}
}

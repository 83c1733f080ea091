//! RTCP packet parsing (RFC 3550 §6) and the empty Receiver Report this
//! client sends back.
//!
//! An RTCP UDP datagram (or de-interleaved frame) is a *compound packet*: a
//! back-to-back chain of individual RTCP packets, each self-describing its
//! own length. There is no RTCP equivalent in the teacher (a publishing
//! server in this pack never consumed RTCP at all), so this module's shape
//! follows the fixed-header parsing style of `media::rtp` rather than any
//! one teacher file.

use crate::error::RtspError;
use crate::Result;

const COMMON_HEADER_LEN: usize = 4;

/// One packet out of an RTCP compound packet's chain.
#[derive(Debug, Clone)]
pub enum RtcpPacket<'a> {
    SenderReport(SenderReport),
    ReceiverReport { ssrc: u32 },
    SourceDescription,
    Bye { sources: Vec<u32> },
    App,
    ExtendedReport,
    /// An RTCP packet type this client doesn't model further, kept so the
    /// compound-chain length bookkeeping stays correct.
    Unknown { payload_type: u8, payload: &'a [u8] },
}

/// RFC 3550 §6.4.1 Sender Report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_seconds: u32,
    pub ntp_fraction: u32,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    /// NTP timestamp as seconds since the NTP epoch (1900-01-01), used to
    /// derive the wall-clock time of `rtp_timestamp` (spec.md §4.7).
    pub fn ntp_as_f64(&self) -> f64 {
        self.ntp_seconds as f64 + (self.ntp_fraction as f64 / u32::MAX as f64)
    }
}

const PT_SENDER_REPORT: u8 = 200;
const PT_RECEIVER_REPORT: u8 = 201;
const PT_SOURCE_DESCRIPTION: u8 = 202;
const PT_BYE: u8 = 203;
const PT_APP: u8 = 204;
const PT_EXTENDED_REPORT: u8 = 207;

/// Split a compound RTCP datagram into its individual packets.
pub fn parse_compound(buf: &[u8]) -> Result<Vec<RtcpPacket<'_>>> {
    let mut packets = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        if buf.len() - offset < COMMON_HEADER_LEN {
            return Err(RtspError::ProtocolViolation(
                "RTCP compound packet truncated in common header".into(),
            ));
        }
        let header = &buf[offset..];
        let version = header[0] >> 6;
        if version != 2 {
            return Err(RtspError::ProtocolViolation(format!(
                "unsupported RTCP version {version}"
            )));
        }
        let rc = header[0] & 0x1f;
        let payload_type = header[1];
        let length_words = u16::from_be_bytes([header[2], header[3]]) as usize;
        let packet_len = (length_words + 1) * 4;
        if buf.len() - offset < packet_len {
            return Err(RtspError::ProtocolViolation(
                "RTCP packet length exceeds buffer".into(),
            ));
        }
        let body = &buf[offset + COMMON_HEADER_LEN..offset + packet_len];

        let packet = match payload_type {
            PT_SENDER_REPORT => RtcpPacket::SenderReport(parse_sender_report(body)?),
            PT_RECEIVER_REPORT => RtcpPacket::ReceiverReport {
                ssrc: read_u32(body, 0)?,
            },
            PT_SOURCE_DESCRIPTION => RtcpPacket::SourceDescription,
            PT_BYE => {
                let sources = (0..rc as usize)
                    .map(|i| read_u32(body, i * 4))
                    .collect::<Result<Vec<_>>>()?;
                RtcpPacket::Bye { sources }
            }
            PT_APP => RtcpPacket::App,
            PT_EXTENDED_REPORT => RtcpPacket::ExtendedReport,
            other => RtcpPacket::Unknown {
                payload_type: other,
                payload: body,
            },
        };
        packets.push(packet);
        offset += packet_len;
    }
    Ok(packets)
}

fn parse_sender_report(body: &[u8]) -> Result<SenderReport> {
    if body.len() < 20 {
        return Err(RtspError::ProtocolViolation(
            "Sender Report body too short".into(),
        ));
    }
    Ok(SenderReport {
        ssrc: read_u32(body, 0)?,
        ntp_seconds: read_u32(body, 4)?,
        ntp_fraction: read_u32(body, 8)?,
        rtp_timestamp: read_u32(body, 12)?,
        packet_count: read_u32(body, 16)?,
        octet_count: read_u32(body, 20)?,
    })
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or_else(|| RtspError::ProtocolViolation("RTCP field out of bounds".into()))
}

/// Build a minimal, empty Receiver Report (RC=0, no report blocks): the
/// smallest RFC 3550-valid RR a client can send back as a courtesy
/// heartbeat, 8 bytes total (spec.md §4.7).
pub fn empty_receiver_report(ssrc: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0] = (2 << 6) | 0; // V=2, P=0, RC=0
    buf[1] = PT_RECEIVER_REPORT;
    buf[2..4].copy_from_slice(&1u16.to_be_bytes()); // length = 1 (one word beyond the header)
    buf[4..8].copy_from_slice(&ssrc.to_be_bytes());
    buf
}

//! SDP (Session Description Protocol) parsing — RFC 4566.
//!
//! The teacher's `protocol::sdp` only ever *generated* SDP (server side: it
//! built a `DESCRIBE` response body from a `Mount`). A client has to go the
//! other way: turn the `DESCRIBE` response body into a typed descriptor the
//! state machine can pick media sections out of. This module is that read
//! path, kept line-oriented the way the teacher's request/response parsers
//! are (`lines()` + manual field splitting, no parser-combinator crate).
//!
//! SDP is `key=value`, one per line, `key` a single ASCII letter. Session-
//! level keys (`v o s i u e p c b t r z k a`) precede the first `m=` line;
//! media-level keys (`i c b k a`) follow each `m=` until the next `m=` or
//! EOF.

use crate::error::{ParseErrorKind, RtspError};
use crate::Result;

/// Whether a missing session name (`s=`) is tolerated.
///
/// Some cameras omit `s=` entirely; RFC 4566 requires it. [`SdpMode::Loose`]
/// preserves interop with those cameras, matching the teacher's own stated
/// intent to tolerate vendor quirks (see `DESIGN_NOTES` in spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpMode {
    Strict,
    Loose,
}

/// `o=<username> <sess-id> <sess-version> <nettype> <addrtype> <unicast-address>`
#[derive(Debug, Clone)]
pub struct Origin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub nettype: String,
    pub addrtype: String,
    pub address: String,
}

/// `c=<nettype> <addrtype> <connection-address>`
#[derive(Debug, Clone)]
pub struct Connection {
    pub nettype: String,
    pub addrtype: String,
    pub address: String,
}

/// `t=<start-time> <stop-time>`
#[derive(Debug, Clone)]
pub struct Timing {
    pub start: u64,
    pub stop: u64,
}

/// A parsed `a=` line: either a bare flag (`a=sendonly`), a generic
/// `key:value` pair, or one of the well-known sub-grammars this client
/// cares about (rtpmap/fmtp/control), additionally parsed into
/// [`RtpMap`]/[`Fmtp`] so callers don't re-split the raw string.
#[derive(Debug, Clone)]
pub enum Attribute {
    Flag(String),
    Value(String, String),
}

impl Attribute {
    pub fn parse(line: &str) -> Self {
        match line.split_once(':') {
            Some((k, v)) => Attribute::Value(k.to_string(), v.to_string()),
            None => Attribute::Flag(line.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Attribute::Flag(k) => k,
            Attribute::Value(k, _) => k,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Attribute::Flag(_) => None,
            Attribute::Value(_, v) => Some(v),
        }
    }
}

/// `a=rtpmap:<payload-type> <encoding-name>/<clock-rate>[/<channels>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding_name: String,
    pub clock_rate: u32,
    pub channels: Option<u32>,
}

impl RtpMap {
    fn parse(value: &str) -> Result<Self> {
        let (pt, rest) = value.trim().split_once(' ').ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpAttribute,
        })?;
        let payload_type: u8 = pt.trim().parse().map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpAttribute,
        })?;
        let mut parts = rest.trim().splitn(3, '/');
        let encoding_name = parts
            .next()
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidSdpAttribute,
            })?
            .to_string();
        let clock_rate: u32 = parts
            .next()
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidSdpAttribute,
            })?
            .parse()
            .map_err(|_| RtspError::Parse {
                kind: ParseErrorKind::InvalidSdpAttribute,
            })?;
        let channels = parts.next().and_then(|c| c.parse().ok());
        Ok(RtpMap {
            payload_type,
            encoding_name,
            clock_rate,
            channels,
        })
    }
}

/// `a=fmtp:<payload-type> <parameter list>` — the parameter list is itself
/// `;`-separated `key=value` (or bare-flag) pairs, per the encoding's own
/// fmtp grammar (RFC 6184 §8.1 for H.264, RFC 7798 §7.1 for H.265, RFC 3640
/// §4.1 for MPEG4-GENERIC, ...). Kept as a case-insensitive-key list so each
/// depayloader picks out only the parameters it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fmtp {
    pub payload_type: u8,
    pub parameters: Vec<(String, String)>,
}

impl Fmtp {
    fn parse(value: &str) -> Result<Self> {
        let (pt, rest) = value.trim().split_once(' ').ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpAttribute,
        })?;
        let payload_type: u8 = pt.trim().parse().map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpAttribute,
        })?;
        let parameters = rest
            .split(';')
            .filter_map(|kv| {
                let kv = kv.trim();
                if kv.is_empty() {
                    return None;
                }
                match kv.split_once('=') {
                    Some((k, v)) => Some((k.trim().to_string(), v.trim().to_string())),
                    None => Some((kv.to_string(), String::new())),
                }
            })
            .collect();
        Ok(Fmtp {
            payload_type,
            parameters,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// One `m=` section and the media-level fields that follow it.
#[derive(Debug, Clone)]
pub struct Media {
    pub media_type: String,
    pub port: u16,
    pub transport: String,
    pub payload_types: Vec<u8>,
    pub connection: Option<Connection>,
    pub attributes: Vec<Attribute>,
}

impl Media {
    /// `a=rtpmap` entries for this media section, parsed.
    pub fn rtpmaps(&self) -> Vec<RtpMap> {
        self.attributes
            .iter()
            .filter(|a| a.key().eq_ignore_ascii_case("rtpmap"))
            .filter_map(|a| a.value())
            .filter_map(|v| RtpMap::parse(v).ok())
            .collect()
    }

    /// `a=fmtp` entries for this media section, parsed.
    pub fn fmtps(&self) -> Vec<Fmtp> {
        self.attributes
            .iter()
            .filter(|a| a.key().eq_ignore_ascii_case("fmtp"))
            .filter_map(|a| a.value())
            .filter_map(|v| Fmtp::parse(v).ok())
            .collect()
    }

    /// The `a=control` attribute value, if present. `*` and absent both mean
    /// "no track-specific control URI" (caller falls back to the session
    /// base URI).
    pub fn control(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key().eq_ignore_ascii_case("control"))
            .and_then(|a| a.value())
    }

    /// `rtpmap` for a specific payload type, if this media section maps one.
    pub fn rtpmap_for(&self, pt: u8) -> Option<RtpMap> {
        self.rtpmaps().into_iter().find(|m| m.payload_type == pt)
    }

    /// `fmtp` for a specific payload type, if this media section has one.
    pub fn fmtp_for(&self, pt: u8) -> Option<Fmtp> {
        self.fmtps().into_iter().find(|f| f.payload_type == pt)
    }
}

/// A parsed SDP session description (RFC 4566 §5).
#[derive(Debug, Clone)]
pub struct SdpDescriptor {
    pub version: u32,
    pub origin: Origin,
    pub session_name: Option<String>,
    pub uri: Option<String>,
    pub connection: Option<Connection>,
    pub timing: Vec<Timing>,
    pub attributes: Vec<Attribute>,
    pub media: Vec<Media>,
}

impl SdpDescriptor {
    /// Session-level `a=control` attribute: becomes the new base URI for
    /// resolving track control URIs (spec.md §4.6 tie-breaks).
    pub fn control(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key().eq_ignore_ascii_case("control"))
            .and_then(|a| a.value())
    }

    pub fn parse(text: &str, mode: SdpMode) -> Result<Self> {
        let mut version: Option<u32> = None;
        let mut origin: Option<Origin> = None;
        let mut session_name: Option<String> = None;
        let mut uri: Option<String> = None;
        let mut connection: Option<Connection> = None;
        let mut timing = Vec::new();
        let mut session_attrs = Vec::new();
        let mut media: Vec<Media> = Vec::new();

        for raw_line in text.lines() {
            let line = raw_line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidSdpLine,
            })?;
            if key.len() != 1 {
                return Err(RtspError::Parse {
                    kind: ParseErrorKind::InvalidSdpLine,
                });
            }
            let key = key.chars().next().unwrap();

            if key == 'm' {
                media.push(parse_media_line(value)?);
                continue;
            }

            if let Some(current) = media.last_mut() {
                match key {
                    'c' => current.connection = Some(parse_connection(value)?),
                    'a' => current.attributes.push(Attribute::parse(value)),
                    // b=, i=, k= at media level: accepted, not modeled further.
                    'b' | 'i' | 'k' => {}
                    _ => {
                        if mode == SdpMode::Strict {
                            return Err(RtspError::Parse {
                                kind: ParseErrorKind::InvalidSdpLine,
                            });
                        }
                        tracing::debug!(key = %key, "ignoring unrecognized SDP key in media section");
                    }
                }
                continue;
            }

            match key {
                'v' => {
                    version = Some(value.trim().parse().map_err(|_| RtspError::Parse {
                        kind: ParseErrorKind::InvalidSdpLine,
                    })?)
                }
                'o' => origin = Some(parse_origin(value)?),
                's' => session_name = Some(value.to_string()),
                'u' => uri = Some(value.to_string()),
                'c' => connection = Some(parse_connection(value)?),
                't' => timing.push(parse_timing(value)?),
                'a' => session_attrs.push(Attribute::parse(value)),
                // i=, e=, p=, b=, r=, z=, k= accepted at session level, not modeled.
                'i' | 'e' | 'p' | 'b' | 'r' | 'z' | 'k' => {}
                _ => {
                    if mode == SdpMode::Strict {
                        return Err(RtspError::Parse {
                            kind: ParseErrorKind::InvalidSdpLine,
                        });
                    }
                    tracing::debug!(key = %key, "ignoring unrecognized session-level SDP key");
                }
            }
        }

        let version = version.ok_or(RtspError::Parse {
            kind: ParseErrorKind::MissingRequiredSdpField,
        })?;
        let origin = origin.ok_or(RtspError::Parse {
            kind: ParseErrorKind::MissingRequiredSdpField,
        })?;
        if media.is_empty() {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::MissingRequiredSdpField,
            });
        }
        if mode == SdpMode::Strict && session_name.as_deref().unwrap_or("").is_empty() {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::MissingRequiredSdpField,
            });
        }

        Ok(SdpDescriptor {
            version,
            origin,
            session_name,
            uri,
            connection,
            timing,
            attributes: session_attrs,
            media,
        })
    }

    /// Re-emit this descriptor as SDP text (RFC 4566 §5 line order), the
    /// teacher's own `generate_sdp` build-a-`Vec<String>`-then-join style
    /// turned into a general inverse of [`Self::parse`] instead of a
    /// from-scratch session description built off a `Mount`.
    ///
    /// Only a best-effort inverse: fields this client never models (`u=`,
    /// `e=`, `p=`, `b=`, `r=`, `z=`, `k=`) are dropped if present on the
    /// parsed side, and attribute order within a section is preserved but
    /// not cross-checked against the original byte-for-byte. What the
    /// round trip does guarantee is every `(media, payload-type,
    /// control-uri, fmtp, rtpmap)` tuple `parse` exposed.
    pub fn re_emit(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push(format!("v={}", self.version));
        lines.push(format!(
            "o={} {} {} {} {} {}",
            self.origin.username,
            self.origin.session_id,
            self.origin.session_version,
            self.origin.nettype,
            self.origin.addrtype,
            self.origin.address,
        ));
        if let Some(name) = &self.session_name {
            lines.push(format!("s={name}"));
        }
        if let Some(uri) = &self.uri {
            lines.push(format!("u={uri}"));
        }
        if let Some(c) = &self.connection {
            lines.push(format!("c={} {} {}", c.nettype, c.addrtype, c.address));
        }
        for t in &self.timing {
            lines.push(format!("t={} {}", t.start, t.stop));
        }
        for a in &self.attributes {
            lines.push(format_attribute(a));
        }
        for m in &self.media {
            let payload_types = m
                .payload_types
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(format!("m={} {} {} {payload_types}", m.media_type, m.port, m.transport));
            if let Some(c) = &m.connection {
                lines.push(format!("c={} {} {}", c.nettype, c.addrtype, c.address));
            }
            for a in &m.attributes {
                lines.push(format_attribute(a));
            }
        }
        lines.join("\r\n") + "\r\n"
    }
}

fn format_attribute(a: &Attribute) -> String {
    match a {
        Attribute::Flag(key) => format!("a={key}"),
        Attribute::Value(key, value) => format!("a={key}:{value}"),
    }
}

fn parse_origin(value: &str) -> Result<Origin> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 6 {
        return Err(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        });
    }
    Ok(Origin {
        username: parts[0].to_string(),
        session_id: parts[1].to_string(),
        session_version: parts[2].to_string(),
        nettype: parts[3].to_string(),
        addrtype: parts[4].to_string(),
        address: parts[5].to_string(),
    })
}

fn parse_connection(value: &str) -> Result<Connection> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        });
    }
    Ok(Connection {
        nettype: parts[0].to_string(),
        addrtype: parts[1].to_string(),
        address: parts[2].to_string(),
    })
}

fn parse_timing(value: &str) -> Result<Timing> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        });
    }
    let start = parts[0].parse().map_err(|_| RtspError::Parse {
        kind: ParseErrorKind::InvalidSdpLine,
    })?;
    let stop = parts[1].parse().map_err(|_| RtspError::Parse {
        kind: ParseErrorKind::InvalidSdpLine,
    })?;
    Ok(Timing { start, stop })
}

fn parse_media_line(value: &str) -> Result<Media> {
    let mut parts = value.split_whitespace();
    let media_type = parts
        .next()
        .ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        })?
        .to_string();
    let port: u16 = parts
        .next()
        .ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        })?
        .split('/')
        .next()
        .unwrap_or("0")
        .parse()
        .map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        })?;
    let transport = parts
        .next()
        .ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        })?
        .to_string();
    let payload_types: Vec<u8> = parts.filter_map(|p| p.parse().ok()).collect();
    if payload_types.is_empty() {
        return Err(RtspError::Parse {
            kind: ParseErrorKind::InvalidSdpLine,
        });
    }
    Ok(Media {
        media_type,
        port,
        transport,
        payload_types,
        connection: None,
        attributes: Vec::new(),
    })
}

/// Resolve a track's `control` attribute against the session base URI
/// (spec.md §4.6): an absolute URI is used verbatim; a relative one is
/// joined under the base with a guaranteed trailing slash.
pub fn join_control(base: &str, control: &str) -> String {
    if control == "*" {
        return base.to_string();
    }
    if control.contains("://") {
        return control.to_string();
    }
    let mut base = base.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    base.push_str(control);
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "\
v=0\r
o=- 12345 1 IN IP4 192.168.1.10\r
s=IP Camera\r
c=IN IP4 192.168.1.10\r
t=0 0\r
a=control:*\r
m=video 0 RTP/AVP 96\r
a=rtpmap:96 H264/90000\r
a=fmtp:96 sprop-parameter-sets=Z0IAH6tAUB7TcBAQEACA,aM48gA==\r
a=control:trackID=1\r
m=audio 0 RTP/AVP 0\r
a=control:trackID=2\r
";

    #[test]
    fn parses_two_media_sections() {
        let sdp = SdpDescriptor::parse(FIXTURE, SdpMode::Strict).unwrap();
        assert_eq!(sdp.version, 0);
        assert_eq!(sdp.origin.address, "192.168.1.10");
        assert_eq!(sdp.session_name.as_deref(), Some("IP Camera"));
        assert_eq!(sdp.media.len(), 2);
        assert_eq!(sdp.media[0].media_type, "video");
        assert_eq!(sdp.media[0].payload_types, vec![96]);
    }

    #[test]
    fn s2_rtpmap_fmtp_control_resolve() {
        let sdp = SdpDescriptor::parse(FIXTURE, SdpMode::Strict).unwrap();
        let video = &sdp.media[0];
        let rtpmap = video.rtpmap_for(96).unwrap();
        assert_eq!(rtpmap.encoding_name, "H264");
        assert_eq!(rtpmap.clock_rate, 90000);

        let fmtp = video.fmtp_for(96).unwrap();
        let sprop = fmtp.get("sprop-parameter-sets").unwrap();
        let mut sets = sprop.split(',');
        use base64::Engine as _;
        let sps = base64::engine::general_purpose::STANDARD
            .decode(sets.next().unwrap())
            .unwrap();
        let pps = base64::engine::general_purpose::STANDARD
            .decode(sets.next().unwrap())
            .unwrap();
        assert!(!sps.is_empty());
        assert!(!pps.is_empty());

        let control = video.control().unwrap();
        let resolved = join_control("rtsp://cam/stream", control);
        assert_eq!(resolved, "rtsp://cam/stream/trackID=1");
    }

    /// spec.md §8 invariant 7: parsing then re-emitting preserves the set
    /// of `(media, payload-type, control-uri, fmtp, rtpmap)` tuples.
    #[test]
    fn parse_then_re_emit_then_reparse_preserves_media_tuples() {
        fn tuples(sdp: &SdpDescriptor) -> Vec<(String, Vec<u8>, Option<String>, Vec<(u8, RtpMap)>, Vec<(u8, Fmtp)>)> {
            sdp.media
                .iter()
                .map(|m| {
                    let rtpmaps = m.payload_types.iter().filter_map(|&pt| m.rtpmap_for(pt).map(|r| (pt, r))).collect();
                    let fmtps = m.payload_types.iter().filter_map(|&pt| m.fmtp_for(pt).map(|f| (pt, f))).collect();
                    (m.media_type.clone(), m.payload_types.clone(), m.control().map(str::to_string), rtpmaps, fmtps)
                })
                .collect()
        }

        let original = SdpDescriptor::parse(FIXTURE, SdpMode::Strict).unwrap();
        let re_emitted = original.re_emit();
        let reparsed = SdpDescriptor::parse(&re_emitted, SdpMode::Strict).unwrap();

        assert_eq!(tuples(&original), tuples(&reparsed));
    }

    #[test]
    fn loose_mode_allows_missing_session_name() {
        let text = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\nm=video 0 RTP/AVP 96\r\n";
        assert!(SdpDescriptor::parse(text, SdpMode::Strict).is_err());
        assert!(SdpDescriptor::parse(text, SdpMode::Loose).is_ok());
    }

    #[test]
    fn missing_media_section_errors() {
        let text = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=S\r\n";
        assert!(SdpDescriptor::parse(text, SdpMode::Strict).is_err());
    }

    #[test]
    fn absolute_control_uri_used_verbatim() {
        assert_eq!(
            join_control("rtsp://cam/base", "rtsp://cam/other/track1"),
            "rtsp://cam/other/track1"
        );
    }

    #[test]
    fn star_control_resolves_to_base() {
        assert_eq!(join_control("rtsp://cam/base", "*"), "rtsp://cam/base");
    }
}

//! RTSP message model (RFC 2326 §4, §6, §7).
//!
//! RTSP requests and responses share HTTP/1.1-like syntax:
//!
//! ```text
//! Method SP Request-URI SP RTSP-Version CRLF    (request)
//! RTSP-Version SP Status-Code SP Reason-Phrase CRLF  (response)
//! *(Header: Value CRLF)
//! CRLF
//! [body]
//! ```
//!
//! Both sides share one [`HeaderMap`]: case-insensitive lookup, order-
//! preserving iteration (RFC 2326 §4.2 does not mandate header order, but
//! preserving the order a server sent them in makes `CSeq`/`Session`
//! debugging sane and costs nothing).

use std::fmt;

/// RTSP method (RFC 2326 §6.1, plus the ONVIF/RTSP 2.0 extensions this
/// client may send or recognize).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Describe,
    Announce,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
    SetParameter,
    Redirect,
    Record,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::SetParameter => "SET_PARAMETER",
            Method::Redirect => "REDIRECT",
            Method::Record => "RECORD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "OPTIONS" => Method::Options,
            "DESCRIBE" => Method::Describe,
            "ANNOUNCE" => Method::Announce,
            "SETUP" => Method::Setup,
            "PLAY" => Method::Play,
            "PAUSE" => Method::Pause,
            "TEARDOWN" => Method::Teardown,
            "GET_PARAMETER" => Method::GetParameter,
            "SET_PARAMETER" => Method::SetParameter,
            "REDIRECT" => Method::Redirect,
            "RECORD" => Method::Record,
            _ => return None,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, case-insensitive-lookup header bag shared by requests and
/// responses.
///
/// Stored as `(String, String)` pairs in receipt/insertion order, same
/// representation the teacher used for its request-only header bag
/// (`protocol::request::RtspRequest::headers`), generalized for reuse on
/// the response side too.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a header, replacing any existing value(s) under the same
    /// case-insensitive name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Append a header without removing an existing one under the same name
    /// (rarely needed; RTSP headers are normally singular).
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Tags an outbound request so the response router can tell user-initiated
/// traffic from the keepalive ticker (spec: a 401 on a keepalive must not
/// terminate the session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurposeTag {
    UserRequest,
    Keepalive,
}

/// A parsed or to-be-sent RTSP request.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    /// Request-URI, or `None` for the `*` sentinel (used by session-less
    /// OPTIONS / keepalive requests).
    pub uri: Option<String>,
    pub cseq: u32,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: Option<String>) -> Self {
        Self {
            method,
            uri,
            cseq: 0,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn request_uri_str(&self) -> &str {
        self.uri.as_deref().unwrap_or("*")
    }

    /// Serialize to the wire format. `cseq` must already be assigned.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = format!(
            "{} {} RTSP/1.0\r\n",
            self.method,
            self.request_uri_str()
        );
        out.push_str(&format!("CSeq: {}\r\n", self.cseq));
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("CSeq") {
                continue;
            }
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        if !self.body.is_empty() {
            out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        out.push_str("\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Clone this request for a re-authenticated retransmission: same
    /// method/URI/body, a fresh (empty) header set the caller re-populates,
    /// and CSeq left at 0 for the listener to re-assign.
    pub fn clone_for_resend(&self) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case("CSeq") || name.eq_ignore_ascii_case("Authorization") {
                continue;
            }
            headers.append(name, value);
        }
        Self {
            method: self.method,
            uri: self.uri.clone(),
            cseq: 0,
            headers,
            body: self.body.clone(),
        }
    }
}

/// A parsed or to-be-sent RTSP response.
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub reason: String,
    pub cseq: u32,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RtspResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }
}

/// One interleaved binary chunk (RFC 2326 §10.12): `$ channel len payload`.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub channel: u8,
    pub payload: Vec<u8>,
}

/// A single unit read from, or written to, an RTSP connection.
#[derive(Debug, Clone)]
pub enum RtspMessage {
    Request(RtspRequest),
    Response(RtspResponse),
    Data(DataFrame),
}

/// Parse the header block of a text RTSP message (everything between the
/// start line and the blank line, exclusive of the start line itself).
///
/// Shared by request and response parsing; CSeq is pulled out explicitly
/// because both message kinds require it (RFC 2326 §12.17).
pub(crate) fn parse_headers(lines: &mut std::str::Lines<'_>) -> crate::Result<(HeaderMap, u32)> {
    use crate::error::{ParseErrorKind, RtspError};

    let mut headers = HeaderMap::new();
    let mut cseq: Option<u32> = None;

    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        let colon = line.find(':').ok_or(RtspError::Parse {
            kind: ParseErrorKind::InvalidHeader,
        })?;
        let name = line[..colon].trim().to_string();
        let value = line[colon + 1..].trim().to_string();
        if name.eq_ignore_ascii_case("CSeq") {
            cseq = value.parse().ok();
        }
        headers.append(name, value);
    }

    let cseq = cseq.ok_or(RtspError::Parse {
        kind: ParseErrorKind::MissingCSeq,
    })?;

    Ok((headers, cseq))
}

impl RtspResponse {
    /// Parse a complete response (start line + headers; body is attached
    /// separately by the listener once `Content-Length` bytes have arrived).
    pub fn parse_head(raw: &str) -> crate::Result<Self> {
        use crate::error::{ParseErrorKind, RtspError};

        let mut lines = raw.lines();
        let status_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;
        let parts: Vec<&str> = status_line.trim_end_matches('\r').splitn(3, ' ').collect();
        if parts.len() != 3 || !parts[0].starts_with("RTSP/") {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidStartLine,
            });
        }
        let status_code: u16 = parts[1].parse().map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidStartLine,
        })?;
        let reason = parts[2].to_string();

        let (headers, cseq) = parse_headers(&mut lines)?;

        Ok(RtspResponse {
            status_code,
            reason,
            cseq,
            headers,
            body: Vec::new(),
        })
    }
}

//! Error types for the RTSP client library.

use std::fmt;

/// Errors that can occur while negotiating or running an RTSP/RTP session.
///
/// Variants map to the failure modes of the client state machine:
///
/// - **Transport**: [`Io`](Self::Io), [`TransportUnreachable`](Self::TransportUnreachable),
///   [`Timeout`](Self::Timeout).
/// - **Protocol**: [`Parse`](Self::Parse), [`ProtocolViolation`](Self::ProtocolViolation).
/// - **Auth**: [`AuthenticationFailed`](Self::AuthenticationFailed).
/// - **Session**: [`SessionClosed`](Self::SessionClosed),
///   [`UnsupportedMedia`](Self::UnsupportedMedia).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not reach the RTSP server or a negotiated RTP/RTCP endpoint.
    #[error("transport unreachable: {0}")]
    TransportUnreachable(String),

    /// Credentials were rejected a second time, or no credentials were
    /// supplied for a server that requires them.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A malformed message or an unexpected status code broke the handshake.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// DESCRIBE returned a session description with no media section this
    /// client has a depayloader for.
    #[error("no supported media found in session description")]
    UnsupportedMedia,

    /// An operation was attempted after [`Client::stop`](crate::client::Client::stop)
    /// or after the connection was lost.
    #[error("session is closed")]
    SessionClosed,

    /// An I/O operation did not complete within the configured deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Failed to parse an RTSP message (RFC 2326 §4) or an SDP descriptor
    /// (RFC 4566).
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },
}

/// Specific kind of parse failure, surfaced by [`RtspError::Parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no status/request line).
    EmptyMessage,
    /// The first line did not match `METHOD SP URI SP RTSP/1.0` or
    /// `RTSP/1.0 SP code SP reason`.
    InvalidStartLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was present but not a valid non-negative integer.
    InvalidContentLength,
    /// CSeq was missing where the protocol requires it.
    MissingCSeq,
    /// An interleaved (`$`) frame's header was truncated.
    TruncatedInterleavedFrame,
    /// SDP: a line was missing the `key=value` separator, or the key was
    /// not a recognized single-letter type.
    InvalidSdpLine,
    /// SDP: a required field (`v=`, `o=`, or at least one `m=`) was absent.
    MissingRequiredSdpField,
    /// SDP: an `a=rtpmap`/`a=fmtp`/`a=control` attribute had the wrong
    /// sub-grammar.
    InvalidSdpAttribute,
    /// The `WWW-Authenticate` challenge was not well-formed Digest/Basic.
    InvalidAuthChallenge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidStartLine => write!(f, "invalid request/status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid Content-Length"),
            Self::MissingCSeq => write!(f, "missing CSeq"),
            Self::TruncatedInterleavedFrame => write!(f, "truncated interleaved frame"),
            Self::InvalidSdpLine => write!(f, "invalid SDP line"),
            Self::MissingRequiredSdpField => write!(f, "missing required SDP field"),
            Self::InvalidSdpAttribute => write!(f, "invalid SDP attribute"),
            Self::InvalidAuthChallenge => write!(f, "invalid authentication challenge"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;

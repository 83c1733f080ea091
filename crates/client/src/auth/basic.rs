//! HTTP Basic authentication (RFC 2617 §2), as used by a handful of cameras
//! that never graduated to Digest.

use base64::Engine as _;

use crate::error::{ParseErrorKind, RtspError};
use crate::Result;

use super::Credentials;

/// Parse the `realm="..."` parameter out of a `Basic` challenge. The realm
/// isn't needed to build the response, but parsing it lets the caller
/// surface it in logs/errors the way a Digest challenge's realm is surfaced.
pub fn parse_realm(rest: &str) -> Result<String> {
    for param in rest.split(',') {
        let param = param.trim();
        if let Some(value) = param.strip_prefix("realm=") {
            return Ok(unquote(value));
        }
    }
    Err(RtspError::Parse {
        kind: ParseErrorKind::InvalidAuthChallenge,
    })
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

pub fn authorization(creds: &Credentials) -> String {
    let raw = format!("{}:{}", creds.username, creds.password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
    format!("Basic {encoded}")
}

//! HTTP Digest authentication (RFC 2617 §3), the scheme nearly every IP
//! camera actually speaks. RTSP reuses it unmodified (RFC 2326 §19.6):
//! the `Authorization` header is computed the same way, `uri` is the RTSP
//! request-URI instead of an HTTP one, and `method` is the RTSP method.
//!
//! Only `qop=auth` (or no `qop` at all) is implemented; `qop=auth-int`
//! (body-hash-dependent) is not something any camera in the field uses.

use std::sync::atomic::{AtomicU32, Ordering};

use md5::{Digest, Md5};

use crate::error::{ParseErrorKind, RtspError};
use crate::Result;

use super::Credentials;

/// A parsed Digest challenge (the parameters of a `WWW-Authenticate:
/// Digest ...` header).
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    algorithm: Algorithm,
    /// Generated once when the challenge is parsed and reused for every
    /// `Authorization` built from it (RFC 2617 §3.2.2: the client nonce is
    /// fixed for the lifetime of a challenge, not re-rolled per request).
    cnonce: String,
    /// Nonce-count counter, incremented once per `Authorization` built from
    /// this challenge (RFC 2617 §3.2.2: `nc` must strictly increase across
    /// requests reusing the same nonce).
    nonce_count: AtomicU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Md5Sess,
}

impl DigestChallenge {
    /// Parse the parameter list following the `Digest ` scheme token.
    pub fn parse(rest: &str) -> Result<Self> {
        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop = None;
        let mut algorithm = Algorithm::Md5;

        for param in split_params(rest) {
            let (key, value) = param.split_once('=').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidAuthChallenge,
            })?;
            let key = key.trim();
            let value = unquote(value.trim());
            match key {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop = Some(value),
                "algorithm" => {
                    algorithm = if value.eq_ignore_ascii_case("MD5-sess") {
                        Algorithm::Md5Sess
                    } else {
                        Algorithm::Md5
                    }
                }
                _ => {}
            }
        }

        Ok(DigestChallenge {
            realm: realm.ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidAuthChallenge,
            })?,
            nonce: nonce.ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidAuthChallenge,
            })?,
            opaque,
            qop,
            algorithm,
            cnonce: make_cnonce(),
            nonce_count: AtomicU32::new(0),
        })
    }

    /// Build the `Authorization` header value for one request.
    ///
    /// Each call bumps the internal nonce-count, so a challenge must not be
    /// reused across unrelated requests that should each carry their own
    /// `nc` — the client keeps one [`DigestChallenge`] per 401 received and
    /// discards it once re-authentication succeeds or fails for good.
    pub fn authorization(&self, creds: &Credentials, method: &str, uri: &str, body: &[u8]) -> String {
        let ha1 = self.ha1(creds);
        let ha2 = ha2(method, uri, body, self.qop.as_deref());

        let (response, cnonce_param, nc_param, qop_param) = match self.qop.as_deref() {
            Some(qop) if qop.split(',').any(|q| q.trim() == "auth") => {
                let nc = self.nonce_count.fetch_add(1, Ordering::SeqCst) + 1;
                let nc_str = format!("{nc:08x}");
                let cnonce = &self.cnonce;
                let response = md5_hex(&format!(
                    "{ha1}:{nonce}:{nc_str}:{cnonce}:auth:{ha2}",
                    nonce = self.nonce
                ));
                (
                    response,
                    format!(", cnonce=\"{cnonce}\""),
                    format!(", nc={nc_str}"),
                    ", qop=auth".to_string(),
                )
            }
            _ => {
                let response = md5_hex(&format!("{ha1}:{nonce}:{ha2}", nonce = self.nonce));
                (response, String::new(), String::new(), String::new())
            }
        };

        let opaque_param = self
            .opaque
            .as_ref()
            .map(|o| format!(", opaque=\"{o}\""))
            .unwrap_or_default();

        format!(
            "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", response=\"{response}\"{qop_param}{cnonce_param}{nc_param}{opaque_param}",
            username = creds.username,
            realm = self.realm,
            nonce = self.nonce,
        )
    }

    fn ha1(&self, creds: &Credentials) -> String {
        let base = md5_hex(&format!(
            "{username}:{realm}:{password}",
            username = creds.username,
            realm = self.realm,
            password = creds.password
        ));
        match self.algorithm {
            Algorithm::Md5 => base,
            Algorithm::Md5Sess => {
                md5_hex(&format!("{base}:{nonce}:{cnonce}", nonce = self.nonce, cnonce = self.cnonce))
            }
        }
    }
}

fn ha2(method: &str, uri: &str, _body: &[u8], _qop: Option<&str>) -> String {
    // auth-int (body-hash) is intentionally unsupported; always RFC 2617 §3.2.2.1 "auth" form.
    md5_hex(&format!("{method}:{uri}"))
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn make_cnonce() -> String {
    use rand::Rng;
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

fn split_params(rest: &str) -> Vec<String> {
    // Split on commas that are not inside a quoted string.
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in rest.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                if !current.trim().is_empty() {
                    params.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        params.push(current.trim().to_string());
    }
    params
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_known_answer_no_qop() {
        let challenge = DigestChallenge::parse(
            r#"realm="IP Camera(21388)", nonce="534407f373af1bdff561b7b4da295354""#,
        )
        .unwrap();
        let creds = Credentials {
            username: "admin".into(),
            password: "1234".into(),
        };
        let auth = challenge.authorization(
            &creds,
            "DESCRIBE",
            "rtsp://cam/axis-media/media.amp",
            b"",
        );
        assert!(auth.contains("response=\"1cc321f268a643495cc62e0fde57e72a\""));
        assert!(auth.contains("username=\"admin\""));
        assert!(auth.contains(r#"realm="IP Camera(21388)""#));
        assert!(!auth.contains("qop="));
    }

    #[test]
    fn qop_auth_increments_nonce_count() {
        let challenge = DigestChallenge::parse(
            r#"realm="r", nonce="abc123", qop="auth""#,
        )
        .unwrap();
        let creds = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        let first = challenge.authorization(&creds, "OPTIONS", "rtsp://h/s", b"");
        let second = challenge.authorization(&creds, "OPTIONS", "rtsp://h/s", b"");
        assert!(first.contains("nc=00000001"));
        assert!(second.contains("nc=00000002"));

        let cnonce = |auth: &str| {
            auth.split(", cnonce=\"")
                .nth(1)
                .and_then(|rest| rest.split('"').next())
                .unwrap()
                .to_string()
        };
        assert_eq!(
            cnonce(&first),
            cnonce(&second),
            "cnonce must stay fixed for the lifetime of a challenge"
        );
    }

    #[test]
    fn parse_rejects_missing_nonce() {
        assert!(DigestChallenge::parse(r#"realm="r""#).is_err());
    }
}

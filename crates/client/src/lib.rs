//! # rtsp_client — RTSP/RTP/RTCP client library for pulling live media streams
//!
//! A Rust library for consuming live media streams (H.264, H.265, MJPEG,
//! MPEG2-TS, G.711, AAC, AMR) from an RTSP server such as an IP camera or
//! NVR, over the Real-Time Streaming Protocol (RTSP).
//!
//! ## Protocol references
//!
//! | RFC | Topic | How this crate uses it |
//! |-----|-------|----------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Request/response parsing, session lifecycle, transport negotiation |
//! | [RFC 2617](https://tools.ietf.org/html/rfc2617) | HTTP auth | Basic/Digest challenge-response on `401` |
//! | [RFC 3550](https://tools.ietf.org/html/rfc3550) | RTP/RTCP | Packet header parsing, Sender Report wall-clock derivation |
//! | [RFC 4566](https://tools.ietf.org/html/rfc4566) | SDP | Parsing the `DESCRIBE` response body into media sections |
//! | [RFC 6184](https://tools.ietf.org/html/rfc6184) | H.264 RTP payload | FU-A reassembly, `sprop-parameter-sets` |
//! | [RFC 7798](https://tools.ietf.org/html/rfc7798) | H.265 RTP payload | FU reassembly, aggregation packets |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Client        — public API, state machine│
//! ├──────────────────────────────────────────┤
//! │  Session       — phase, Session: id, SR→  │
//! │                  wall-clock bookkeeping    │
//! │  Auth          — Basic/Digest challenge    │
//! ├──────────────────────────────────────────┤
//! │  Protocol      — RTSP parsing, SDP parsing│
//! │  Transport     — UDP / TCP-interleaved /  │
//! │                  multicast RTP delivery   │
//! ├──────────────────────────────────────────┤
//! │  Media         — RTP header, depayloaders │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use rtsp_client::{Client, ClientConfig};
//!
//! let config = ClientConfig {
//!     url: "rtsp://192.168.1.10/stream1".to_string(),
//!     ..Default::default()
//! };
//! let (client, events) = Client::new(config);
//! client.connect().unwrap();
//!
//! for event in events {
//!     tracing::info!(?event, "stream event");
//! }
//! ```
//!
//! ## Crate layout
//!
//! - [`client`] — High-level [`Client`] state machine and [`ClientConfig`].
//! - [`auth`] — HTTP Basic/Digest challenge parsing and response (RFC 2617).
//! - [`protocol`] — RTSP request/response parsing and SDP parsing.
//! - [`session`] — Client session phase, track bookkeeping, `Transport:` header handling.
//! - [`listener`] — Framed RTSP connection reader/writer, CSeq-correlated request/response.
//! - [`transport`] — UDP, TCP-interleaved, and multicast RTP/RTCP delivery.
//! - [`tunnel`] — HTTP-tunneled RTSP connection setup for `http://` URLs.
//! - [`media`] — [`media::Depayloader`] trait, RTP header parsing, codec implementations.
//! - [`error`] — [`RtspError`] enum and [`Result`] alias.

pub mod auth;
pub mod client;
pub mod error;
pub mod listener;
pub mod media;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod tunnel;

pub use client::{Client, ClientConfig, ClientEvent, MediaMask, TransportPreference};
pub use error::{Result, RtspError};

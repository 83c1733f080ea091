//! Client-side RTSP session bookkeeping (RFC 2326 §3, §12.37).
//!
//! The teacher's `Session`/`SessionManager` pair tracked many concurrently
//! open sessions server-side, keyed by session id in a `HashMap`, because a
//! publishing server accepts connections from any number of viewers. A
//! client has exactly one session for the one connection it opens, so this
//! keeps the teacher's `Session` "id + playback state + transport" shape
//! but drops the registry around it — there is one `Session`, owned
//! directly by [`crate::client::Client`], not looked up by id.
//!
//! This module also carries the per-track Sender Report bookkeeping RTCP
//! needs to translate RTP timestamps into wall-clock time (RFC 3550 §6.4.1).

pub mod transport;

use std::time::Duration;

use parking_lot::RwLock;

pub use transport::{build_transport_header, parse_transport_response, ParsedTransport};

/// Linear client-session state machine (spec.md §4.6).
///
/// `SettingUp` carries the number of SETUP requests still queued behind the
/// one currently in flight, mirroring the teacher's `SessionState::Ready`
/// in spirit (created but not yet playing) while being specific about how
/// many tracks remain to negotiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    OptionsSent,
    Describing,
    SettingUp { pending: usize },
    Playing,
    Paused,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Everything learned about one negotiated track: which media section it
/// came from, its resolved control URI, and the depayloader parameters
/// that URI's SETUP response confirmed.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub kind: MediaKind,
    pub control_uri: String,
    pub payload_type: u8,
    pub codec_name: String,
    pub clock_rate: u32,
}

/// The most recent RTCP Sender Report observed for a track, used to derive
/// wall-clock timestamps for frames as they're emitted (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
struct SenderReportAnchor {
    ntp_time: f64,
    rtp_timestamp: u32,
}

#[derive(Debug, Default)]
struct TrackReports {
    anchor: RwLock<Option<SenderReportAnchor>>,
}

impl TrackReports {
    fn record(&self, ntp_time: f64, rtp_timestamp: u32) {
        *self.anchor.write() = Some(SenderReportAnchor { ntp_time, rtp_timestamp });
    }

    /// `wallclock = ntp_time + (frame_rtp_ts - sr_rtp_ts) / clock_rate`
    /// (spec.md §4.7). `None` until the first SR for this track arrives —
    /// callers fall back to a minimum-time sentinel per spec.md §3's Frame
    /// definition.
    fn derive(&self, frame_rtp_ts: u32, clock_rate: u32) -> Option<f64> {
        let anchor = (*self.anchor.read())?;
        let delta = frame_rtp_ts.wrapping_sub(anchor.rtp_timestamp) as i32;
        Some(anchor.ntp_time + delta as f64 / clock_rate as f64)
    }
}

/// The client's single RTSP session: phase, assigned session id, base URI
/// for resolving track control URIs, and per-track state.
#[derive(Debug)]
pub struct Session {
    phase: RwLock<SessionPhase>,
    id: RwLock<Option<String>>,
    base_uri: RwLock<String>,
    video: RwLock<Option<TrackInfo>>,
    audio: RwLock<Option<TrackInfo>>,
    video_reports: TrackReports,
    audio_reports: TrackReports,
    keepalive_interval: RwLock<Duration>,
    playback_session: bool,
}

/// Upper bound on the keepalive interval regardless of what the server
/// advertises (spec.md §4.6: `min(20s, timeout/2)`).
pub const MAX_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

impl Session {
    pub fn new(base_uri: String, playback_session: bool) -> Self {
        Self {
            phase: RwLock::new(SessionPhase::Idle),
            id: RwLock::new(None),
            base_uri: RwLock::new(base_uri),
            video: RwLock::new(None),
            audio: RwLock::new(None),
            video_reports: TrackReports::default(),
            audio_reports: TrackReports::default(),
            keepalive_interval: RwLock::new(MAX_KEEPALIVE_INTERVAL),
            playback_session,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.read().clone()
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        tracing::debug!(old = ?*self.phase.read(), new = ?phase, "session phase transition");
        *self.phase.write() = phase;
    }

    pub fn id(&self) -> Option<String> {
        self.id.read().clone()
    }

    pub fn set_id(&self, id: String) {
        *self.id.write() = Some(id);
    }

    pub fn base_uri(&self) -> String {
        self.base_uri.read().clone()
    }

    pub fn set_base_uri(&self, uri: String) {
        *self.base_uri.write() = uri;
    }

    pub fn track(&self, kind: MediaKind) -> Option<TrackInfo> {
        match kind {
            MediaKind::Video => self.video.read().clone(),
            MediaKind::Audio => self.audio.read().clone(),
        }
    }

    pub fn set_track(&self, track: TrackInfo) {
        match track.kind {
            MediaKind::Video => *self.video.write() = Some(track),
            MediaKind::Audio => *self.audio.write() = Some(track),
        }
    }

    /// Session-advertised timeout halves the keepalive interval, capped at
    /// [`MAX_KEEPALIVE_INTERVAL`] (spec.md §4.6).
    pub fn note_session_timeout(&self, timeout_secs: u64) {
        let half = Duration::from_secs(timeout_secs / 2);
        let interval = half.min(MAX_KEEPALIVE_INTERVAL).max(Duration::from_secs(1));
        *self.keepalive_interval.write() = interval;
    }

    pub fn keepalive_interval(&self) -> Duration {
        *self.keepalive_interval.read()
    }

    pub fn is_playback_session(&self) -> bool {
        self.playback_session
    }

    pub fn record_sender_report(&self, kind: MediaKind, ntp_time: f64, rtp_timestamp: u32) {
        match kind {
            MediaKind::Video => self.video_reports.record(ntp_time, rtp_timestamp),
            MediaKind::Audio => self.audio_reports.record(ntp_time, rtp_timestamp),
        }
    }

    pub fn derive_wallclock(&self, kind: MediaKind, frame_rtp_ts: u32, clock_rate: u32) -> Option<f64> {
        match kind {
            MediaKind::Video => self.video_reports.derive(frame_rtp_ts, clock_rate),
            MediaKind::Audio => self.audio_reports.derive(frame_rtp_ts, clock_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_interval_halves_and_caps() {
        let session = Session::new("rtsp://h/s".into(), false);
        session.note_session_timeout(10);
        assert_eq!(session.keepalive_interval(), Duration::from_secs(5));

        session.note_session_timeout(120);
        assert_eq!(session.keepalive_interval(), MAX_KEEPALIVE_INTERVAL);
    }

    #[test]
    fn wallclock_derivation_tracks_forward_offset() {
        let session = Session::new("rtsp://h/s".into(), false);
        assert!(session.derive_wallclock(MediaKind::Video, 100, 90000).is_none());

        session.record_sender_report(MediaKind::Video, 1000.0, 90000);
        let wc = session
            .derive_wallclock(MediaKind::Video, 90000 + 45000, 90000)
            .unwrap();
        assert!((wc - 1000.5).abs() < 1e-9);
    }

    #[test]
    fn tracks_stored_independently_per_kind() {
        let session = Session::new("rtsp://h/s".into(), false);
        session.set_track(TrackInfo {
            kind: MediaKind::Video,
            control_uri: "rtsp://h/s/trackID=1".into(),
            payload_type: 96,
            codec_name: "H264".into(),
            clock_rate: 90000,
        });
        assert!(session.track(MediaKind::Audio).is_none());
        assert_eq!(session.track(MediaKind::Video).unwrap().payload_type, 96);
    }
}

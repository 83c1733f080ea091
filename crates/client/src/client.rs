//! The RTSP client state machine (spec.md §4.6).
//!
//! Generalizes the teacher's server-side `MethodHandler` dispatch-by-method
//! pattern (`protocol::handler`) into dispatch-by-original-request-identity
//! on the client side: every request this client sends blocks its caller on
//! [`listener::Listener::request`] until the matching response arrives (by
//! CSeq), so there is no separate response router thread the way a server's
//! read loop needs one — the thread that sent the request *is* the
//! dispatcher for its own response. The one exception is keepalive traffic,
//! which runs on its own ticker thread and tolerates a 401 rather than
//! propagating it (spec.md §4.6, §8 S6).
//!
//! `connect` only opens the socket and runs the handshake; it does not wait
//! for `Playing` before returning control to the caller (spec.md §6:
//! "begins the handshake; returns immediately").

use std::collections::HashMap;
use std::net::TcpStream;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::auth::{Challenge, Credentials};
use crate::error::RtspError;
use crate::listener::Listener;
use crate::media::aac::{AacConfig, AacDepayloader};
use crate::media::amr::{AmrBand, AmrDepayloader};
use crate::media::g711::{G711Depayloader, G711Variant};
use crate::media::h264::H264Depayloader;
use crate::media::h265::H265Depayloader;
use crate::media::mjpeg::MjpegDepayloader;
use crate::media::mp2t::Mp2tDepayloader;
use crate::media::rtcp;
use crate::media::rtp::{Continuity, RtpPacket, SequenceTracker};
use crate::media::Depayloader;
use crate::protocol::{sdp, DataFrame, Media, Method, PurposeTag, RtspRequest, SdpDescriptor, SdpMode};
use crate::session::{
    build_transport_header, parse_transport_response, MediaKind, Session, SessionPhase, TrackInfo,
};
use crate::transport::interleaved::InterleavedTransport;
use crate::transport::multicast::MulticastTransport;
use crate::transport::udp::UdpTransport;
use crate::transport::{RtpTransport, TransportDescriptor};
use crate::Result;

/// Which lower transport the caller wants SETUP to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPreference {
    Udp,
    Tcp,
    Multicast,
}

/// Which media kind(s) to request tracks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMask {
    Video,
    Audio,
    Both,
}

impl MediaMask {
    fn wants(self, kind: MediaKind) -> bool {
        matches!(
            (self, kind),
            (MediaMask::Both, _) | (MediaMask::Video, MediaKind::Video) | (MediaMask::Audio, MediaKind::Audio)
        )
    }
}

/// Connection-wide configuration (spec.md §6 Configuration).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub credentials: Option<Credentials>,
    pub transport_preference: TransportPreference,
    pub media_mask: MediaMask,
    pub playback_session: bool,
    pub strict_sdp: bool,
    pub io_timeout: Duration,
    pub udp_port_range: RangeInclusive<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: None,
            transport_preference: TransportPreference::Udp,
            media_mask: MediaMask::Both,
            playback_session: false,
            strict_sdp: false,
            io_timeout: Duration::from_secs(10),
            udp_port_range: 16384..=32768,
        }
    }
}

/// Events delivered to the embedder (spec.md §6 Embedder API).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    NewVideoStream { codec_name: String, config: Vec<u8> },
    NewAudioStream { codec_name: String, config: Vec<u8> },
    ReceivedVideoData { data: Vec<u8>, wall_clock: Option<f64> },
    ReceivedAudioData { data: Vec<u8>, wall_clock: Option<f64> },
    SetupMessageCompleted,
    StreamingFinished { reason: Option<String> },
}

struct TrackRuntime {
    transport: Arc<Mutex<Box<dyn RtpTransport>>>,
}

struct Inner {
    config: ClientConfig,
    session: Session,
    listener: Mutex<Option<Arc<Listener>>>,
    challenge: Mutex<Option<Challenge>>,
    events: mpsc::Sender<ClientEvent>,
    video_runtime: Mutex<Option<TrackRuntime>>,
    audio_runtime: Mutex<Option<TrackRuntime>>,
    channel_routes: Mutex<HashMap<u8, mpsc::Sender<DataFrame>>>,
    next_interleaved_channel: AtomicU8,
    supports_get_parameter: AtomicBool,
    keepalive_running: Arc<AtomicBool>,
    our_ssrc: u32,
    closed: AtomicBool,
}

/// An RTSP/RTP/RTCP client pulling one media session from a camera/NVR.
///
/// Cheap to clone (shares an `Arc` internally); the keepalive ticker and
/// per-track RTP/RTCP readers each hold a clone alongside the one returned
/// to the embedder.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Construct a client in the `Idle` state. Returns the client plus the
    /// event receiver the embedder should poll (or forward to another
    /// thread) for the lifetime of the session.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel();
        let base_uri = config.url.clone();
        let playback_session = config.playback_session;
        let inner = Arc::new(Inner {
            config,
            session: Session::new(base_uri, playback_session),
            listener: Mutex::new(None),
            challenge: Mutex::new(None),
            events: tx,
            video_runtime: Mutex::new(None),
            audio_runtime: Mutex::new(None),
            channel_routes: Mutex::new(HashMap::new()),
            next_interleaved_channel: AtomicU8::new(0),
            supports_get_parameter: AtomicBool::new(false),
            keepalive_running: Arc::new(AtomicBool::new(false)),
            our_ssrc: rand::rng().random(),
            closed: AtomicBool::new(false),
        });
        (Self { inner }, rx)
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.session.phase()
    }

    /// Begin connecting and negotiating the session in the background.
    /// Returns immediately; progress and failures surface as
    /// [`ClientEvent`]s (spec.md §6).
    pub fn connect(&self) -> Result<()> {
        if !matches!(self.inner.session.phase(), SessionPhase::Idle) {
            return Err(RtspError::ProtocolViolation("already connected".into()));
        }
        let inner = self.inner.clone();
        thread::spawn(move || {
            if let Err(e) = run_handshake(&inner) {
                tracing::warn!(error = %e, "RTSP handshake failed");
                inner.session.set_phase(SessionPhase::TornDown);
                let _ = inner.events.send(ClientEvent::StreamingFinished {
                    reason: Some(e.to_string()),
                });
            }
        });
        Ok(())
    }

    /// Send `PLAY` with no range/speed restriction.
    pub fn play(&self) -> Result<()> {
        self.play_range(None, None, None)
    }

    /// Send `PLAY`, optionally with an NPT range and/or a `Scale` factor
    /// (spec.md §6).
    pub fn play_range(&self, from: Option<f64>, to: Option<f64>, speed: Option<f64>) -> Result<()> {
        match self.inner.session.phase() {
            SessionPhase::Paused | SessionPhase::Playing => {}
            _ => return Err(RtspError::ProtocolViolation("not connected".into())),
        }

        let mut headers: Vec<(&str, String)> = Vec::new();
        if from.is_some() || to.is_some() {
            let from_s = from.map(|v| format!("{v}")).unwrap_or_default();
            let to_s = to.map(|v| format!("{v}")).unwrap_or_default();
            headers.push(("Range", format!("npt={from_s}-{to_s}")));
        }
        if let Some(speed) = speed {
            headers.push(("Scale", speed.to_string()));
        }
        if self.inner.session.is_playback_session() {
            headers.push(("Require", "onvif-replay".to_string()));
            headers.push(("Rate-Control", "no".to_string()));
        }
        let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let base_uri = self.inner.session.base_uri();
        self.inner
            .send_request(Method::Play, Some(&base_uri), &header_refs, Vec::new(), PurposeTag::UserRequest)?;
        self.inner.session.set_phase(SessionPhase::Playing);
        Ok(())
    }

    /// Send `PAUSE`.
    pub fn pause(&self) -> Result<()> {
        if !matches!(self.inner.session.phase(), SessionPhase::Playing) {
            return Err(RtspError::ProtocolViolation("not playing".into()));
        }
        let base_uri = self.inner.session.base_uri();
        self.inner
            .send_request(Method::Pause, Some(&base_uri), &[], Vec::new(), PurposeTag::UserRequest)?;
        self.inner.session.set_phase(SessionPhase::Paused);
        Ok(())
    }

    /// Best-effort `TEARDOWN` plus local teardown of transports and the
    /// keepalive ticker. Subsequent operations on this client return
    /// [`RtspError::SessionClosed`].
    pub fn stop(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.keepalive_running.store(false, Ordering::SeqCst);
        let base_uri = self.inner.session.base_uri();
        let _ = self
            .inner
            .send_request(Method::Teardown, Some(&base_uri), &[], Vec::new(), PurposeTag::UserRequest);

        if let Some(runtime) = self.inner.video_runtime.lock().take() {
            runtime.transport.lock().stop();
        }
        if let Some(runtime) = self.inner.audio_runtime.lock().take() {
            runtime.transport.lock().stop();
        }
        self.inner.session.set_phase(SessionPhase::TornDown);
    }
}

fn run_handshake(inner: &Arc<Inner>) -> Result<()> {
    inner.session.set_phase(SessionPhase::Connecting);

    let url = url::Url::parse(&inner.config.url)
        .map_err(|e| RtspError::ProtocolViolation(format!("invalid RTSP URL: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| RtspError::ProtocolViolation("URL has no host".into()))?
        .to_string();

    let stream = match url.scheme() {
        "http" => {
            let port = url.port().unwrap_or(80);
            crate::tunnel::establish(&host, port, url.path(), inner.config.io_timeout)?
        }
        _ => {
            // rtsp:// and rtsps:// both speak plain RTSP framing on a raw
            // socket here; a TLS handshake for rtsps:// is left to a
            // pluggable transport factory (spec.md §6), not this client.
            let port = url.port().unwrap_or(554);
            let stream = TcpStream::connect((host.as_str(), port))?;
            stream.set_nodelay(true).ok();
            stream
        }
    };
    let (listener, data_rx) = Listener::spawn(stream, inner.config.io_timeout)?;
    *inner.listener.lock() = Some(listener);

    spawn_data_demux(inner.clone(), data_rx);

    inner.session.set_phase(SessionPhase::OptionsSent);
    let base_uri = inner.session.base_uri();
    let options_resp = inner.send_request(Method::Options, Some(&base_uri), &[], Vec::new(), PurposeTag::UserRequest)?;
    let supports_get_parameter = options_resp
        .headers
        .get("Public")
        .map(|p| p.to_ascii_uppercase().contains("GET_PARAMETER"))
        .unwrap_or(false);
    inner
        .supports_get_parameter
        .store(supports_get_parameter, Ordering::SeqCst);
    spawn_keepalive(inner.clone());

    inner.session.set_phase(SessionPhase::Describing);
    let describe_resp = inner.send_request(
        Method::Describe,
        Some(&base_uri),
        &[("Accept", "application/sdp")],
        Vec::new(),
        PurposeTag::UserRequest,
    )?;
    let sdp_text = String::from_utf8_lossy(&describe_resp.body).into_owned();
    let mode = if inner.config.strict_sdp { SdpMode::Strict } else { SdpMode::Loose };
    let sdp = SdpDescriptor::parse(&sdp_text, mode)?;

    if let Some(control) = sdp.control() {
        if control != "*" {
            inner.session.set_base_uri(sdp::join_control(&base_uri, control));
        }
    }

    let mut wanted = Vec::new();
    if inner.config.media_mask.wants(MediaKind::Video) {
        if let Some(selection) = select_media(&sdp, "video") {
            wanted.push((MediaKind::Video, selection));
        }
    }
    if inner.config.media_mask.wants(MediaKind::Audio) {
        if let Some(selection) = select_media(&sdp, "audio") {
            wanted.push((MediaKind::Audio, selection));
        }
    }
    if wanted.is_empty() {
        return Err(RtspError::UnsupportedMedia);
    }

    let total = wanted.len();
    for (index, (kind, (media, codec_name, pt, clock_rate))) in wanted.into_iter().enumerate() {
        inner
            .session
            .set_phase(SessionPhase::SettingUp { pending: total - index - 1 });
        setup_track(inner, kind, &media, pt, &codec_name, clock_rate)?;
    }

    inner.session.set_phase(SessionPhase::Paused);
    let _ = inner.events.send(ClientEvent::SetupMessageCompleted);
    Ok(())
}

/// Find the first media section of `media_type` whose payload type maps to
/// a codec this client depayloads (spec.md §4.6 tie-breaks: first match
/// wins).
fn select_media(sdp: &SdpDescriptor, media_type: &str) -> Option<(Media, String, u8, u32)> {
    for media in &sdp.media {
        if !media.media_type.eq_ignore_ascii_case(media_type) {
            continue;
        }
        for &pt in &media.payload_types {
            if let Some((codec_name, clock_rate)) = codec_for(media, pt) {
                return Some((media.clone(), codec_name, pt, clock_rate));
            }
        }
    }
    None
}

/// RTP/AVP static payload type assignments this client implements a
/// depayloader for (RFC 3551 §6).
fn static_payload_type(pt: u8) -> Option<(&'static str, u32)> {
    match pt {
        0 => Some(("PCMU", 8000)),
        8 => Some(("PCMA", 8000)),
        26 => Some(("JPEG", 90000)),
        33 => Some(("MP2T", 90000)),
        _ => None,
    }
}

fn codec_for(media: &Media, pt: u8) -> Option<(String, u32)> {
    if let Some(rtpmap) = media.rtpmap_for(pt) {
        return Some((rtpmap.encoding_name.to_ascii_uppercase(), rtpmap.clock_rate));
    }
    if pt < 96 {
        return static_payload_type(pt).map(|(name, rate)| (name.to_string(), rate));
    }
    None
}

/// Build the depayloader plus out-of-band configuration bytes (SPS/PPS,
/// AudioSpecificConfig, …) this codec's SDP `fmtp` carries, if any
/// (spec.md §4.5, §4.6: emitted on the first stream event).
fn build_depayloader(codec_name: &str, media: &Media, pt: u8) -> Option<(Box<dyn Depayloader>, Vec<u8>)> {
    let fmtp = media.fmtp_for(pt);
    match codec_name {
        "H264" => {
            let mut d = H264Depayloader::new();
            if let Some(sprop) = fmtp.as_ref().and_then(|f| f.get("sprop-parameter-sets")) {
                d = d.with_sprop_parameter_sets(sprop);
            }
            let config = d.parameter_sets();
            Some((Box::new(d), config))
        }
        "H265" | "HEVC" => {
            let mut d = H265Depayloader::new();
            if let Some(f) = &fmtp {
                d = d
                    .with_parameter_sets(f.get("sprop-vps"), f.get("sprop-sps"), f.get("sprop-pps"))
                    .with_sprop_max_don_diff(f.get("sprop-max-don-diff"));
            }
            let config = d.parameter_sets();
            Some((Box::new(d), config))
        }
        "JPEG" => Some((Box::new(MjpegDepayloader::new()), Vec::new())),
        "MP2T" => Some((Box::new(Mp2tDepayloader::new()), Vec::new())),
        "PCMU" => Some((Box::new(G711Depayloader::new(G711Variant::MuLaw)), Vec::new())),
        "PCMA" => Some((Box::new(G711Depayloader::new(G711Variant::ALaw)), Vec::new())),
        "MPEG4-GENERIC" => {
            let config_bytes = fmtp
                .as_ref()
                .and_then(|f| f.get("config"))
                .and_then(|hex_str| hex::decode(hex_str).ok())
                .unwrap_or_default();
            let aac_config = fmtp.as_ref().map(AacConfig::from_fmtp).unwrap_or_default();
            Some((Box::new(AacDepayloader::new(aac_config)), config_bytes))
        }
        "AMR" => Some((Box::new(AmrDepayloader::new(AmrBand::Narrowband)), Vec::new())),
        "AMR-WB" => Some((Box::new(AmrDepayloader::new(AmrBand::Wideband)), Vec::new())),
        _ => None,
    }
}

fn setup_track(
    inner: &Arc<Inner>,
    kind: MediaKind,
    media: &Media,
    pt: u8,
    codec_name: &str,
    clock_rate: u32,
) -> Result<()> {
    let (depayloader, config) = build_depayloader(codec_name, media, pt).ok_or(RtspError::UnsupportedMedia)?;

    let base_uri = inner.session.base_uri();
    let control_uri = sdp::join_control(&base_uri, media.control().unwrap_or("*"));

    let (descriptor, mut pending_interleaved, pending_udp) = match inner.config.transport_preference {
        TransportPreference::Udp => {
            let transport = UdpTransport::bind_port_pair(inner.config.udp_port_range.clone())?;
            let descriptor = transport.client_descriptor();
            (descriptor, None, Some(transport))
        }
        TransportPreference::Tcp => {
            let base_channel = inner.next_interleaved_channel.fetch_add(2, Ordering::SeqCst);
            let listener = inner.listener()?;
            let (tx, transport) = InterleavedTransport::channel(listener, base_channel, base_channel + 1);
            let descriptor = TransportDescriptor::Interleaved {
                rtp_channel: base_channel,
                rtcp_channel: base_channel + 1,
            };
            (descriptor, Some((base_channel, base_channel + 1, tx, transport)), None)
        }
        TransportPreference::Multicast => (
            TransportDescriptor::Multicast {
                address: std::net::Ipv4Addr::UNSPECIFIED.into(),
                rtp_port: 0,
                rtcp_port: 0,
            },
            None,
            None,
        ),
    };

    let transport_header = build_transport_header(&descriptor);
    let resp = inner.send_request(
        Method::Setup,
        Some(&control_uri),
        &[("Transport", &transport_header)],
        Vec::new(),
        PurposeTag::UserRequest,
    )?;

    let session_header = resp
        .headers
        .get("Session")
        .ok_or_else(|| RtspError::ProtocolViolation("SETUP response missing Session header".into()))?;
    let (session_id, timeout_secs) = parse_session_header(session_header);
    match inner.session.id() {
        None => {
            inner.session.set_id(session_id);
            if let Some(t) = timeout_secs {
                inner.session.note_session_timeout(t);
            }
        }
        Some(existing) if existing == session_id => {}
        Some(_) => {
            return Err(RtspError::ProtocolViolation(
                "SETUP response carried a different Session id than an earlier track".into(),
            ))
        }
    }

    let transport_value = resp
        .headers
        .get("Transport")
        .ok_or_else(|| RtspError::ProtocolViolation("SETUP response missing Transport header".into()))?;
    let parsed = parse_transport_response(transport_value);

    let transport: Box<dyn RtpTransport> = if let Some(udp) = pending_udp {
        // Unicast RTP normally arrives from whatever host the RTSP
        // connection itself is to; SDP's `c=` only matters when it
        // disagrees (rare) or when there is nothing else to go on.
        let connected_host: Option<std::net::IpAddr> = url::Url::parse(&base_uri)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .and_then(|h| h.parse().ok());
        let host = parsed
            .destination
            .or_else(|| media.connection.as_ref().and_then(|c| c.address.parse().ok()))
            .or(connected_host)
            .ok_or_else(|| RtspError::ProtocolViolation("no server address for UDP transport".into()))?;
        let (server_rtp, server_rtcp) = parsed
            .server_port
            .ok_or_else(|| RtspError::ProtocolViolation("SETUP response missing server_port".into()))?;
        let (rtp_addr, rtcp_addr) = crate::transport::udp::resolve_remote(host, server_rtp, server_rtcp);
        udp.set_remote(rtp_addr, rtcp_addr);
        Box::new(udp)
    } else if let Some((base_rtp, base_rtcp, tx, transport)) = pending_interleaved.take() {
        let (final_rtp, final_rtcp) = parsed.interleaved.unwrap_or((base_rtp, base_rtcp));
        let mut routes = inner.channel_routes.lock();
        routes.insert(final_rtp, tx.clone());
        routes.insert(final_rtcp, tx);
        Box::new(transport)
    } else {
        let address = parsed
            .destination
            .or_else(|| media.connection.as_ref().and_then(|c| c.address.parse().ok()))
            .ok_or_else(|| RtspError::ProtocolViolation("no multicast destination in SETUP response".into()))?;
        let (rtp_port, rtcp_port) = parsed.server_port.unwrap_or((media.port, media.port + 1));
        Box::new(MulticastTransport::join(address, rtp_port, rtcp_port, parsed.ttl)?)
    };

    let transport = Arc::new(Mutex::new(transport));
    let (rtp_rx, rtcp_rx) = transport.lock().start()?;

    inner.session.set_track(TrackInfo {
        kind,
        control_uri,
        payload_type: pt,
        codec_name: codec_name.to_string(),
        clock_rate,
    });

    spawn_rtp_reader(inner.clone(), kind, depayloader, clock_rate, codec_name.to_string(), config, rtp_rx);
    spawn_rtcp_reader(inner.clone(), kind, transport.clone(), rtcp_rx);

    match kind {
        MediaKind::Video => *inner.video_runtime.lock() = Some(TrackRuntime { transport }),
        MediaKind::Audio => *inner.audio_runtime.lock() = Some(TrackRuntime { transport }),
    }

    Ok(())
}

fn parse_session_header(value: &str) -> (String, Option<u64>) {
    let mut parts = value.splitn(2, ';');
    let id = parts.next().unwrap_or(value).trim().to_string();
    let timeout = parts
        .next()
        .and_then(|rest| rest.trim().strip_prefix("timeout="))
        .and_then(|t| t.trim().parse().ok());
    (id, timeout)
}

fn spawn_data_demux(inner: Arc<Inner>, data_rx: mpsc::Receiver<DataFrame>) {
    thread::spawn(move || {
        for frame in data_rx {
            let channel = frame.channel;
            let route = inner.channel_routes.lock().get(&channel).cloned();
            match route {
                Some(tx) => {
                    if tx.send(frame).is_err() {
                        tracing::trace!(channel, "interleaved channel reader gone, dropping frame");
                    }
                }
                None => tracing::trace!(channel, "no track registered for interleaved channel"),
            }
        }
    });
}

fn spawn_rtp_reader(
    inner: Arc<Inner>,
    kind: MediaKind,
    mut depayloader: Box<dyn Depayloader>,
    clock_rate: u32,
    codec_name: String,
    config: Vec<u8>,
    rtp_rx: mpsc::Receiver<crate::transport::ReceivedPacket>,
) {
    thread::spawn(move || {
        let mut sequence = SequenceTracker::new();
        let mut announced = false;

        for packet in rtp_rx {
            let parsed = match RtpPacket::parse(&packet.payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed RTP packet");
                    continue;
                }
            };

            if sequence.observe(parsed.sequence_number) == Continuity::Discontinuity {
                tracing::debug!(?kind, "RTP sequence discontinuity, resetting depayloader");
                depayloader.reset();
            }

            if !announced {
                announced = true;
                let event = match kind {
                    MediaKind::Video => ClientEvent::NewVideoStream { codec_name: codec_name.clone(), config: config.clone() },
                    MediaKind::Audio => ClientEvent::NewAudioStream { codec_name: codec_name.clone(), config: config.clone() },
                };
                let _ = inner.events.send(event);
            }

            let frames = match depayloader.push(&parsed) {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed packet during depayloading");
                    continue;
                }
            };

            for mut frame in frames {
                frame.wall_clock = inner.session.derive_wallclock(kind, frame.rtp_timestamp, clock_rate);
                let data = frame.to_contiguous();
                let event = match kind {
                    MediaKind::Video => ClientEvent::ReceivedVideoData { data, wall_clock: frame.wall_clock },
                    MediaKind::Audio => ClientEvent::ReceivedAudioData { data, wall_clock: frame.wall_clock },
                };
                if inner.events.send(event).is_err() {
                    return;
                }
            }
        }
    });
}

fn spawn_rtcp_reader(
    inner: Arc<Inner>,
    kind: MediaKind,
    transport: Arc<Mutex<Box<dyn RtpTransport>>>,
    rtcp_rx: mpsc::Receiver<crate::transport::ReceivedPacket>,
) {
    thread::spawn(move || {
        for packet in rtcp_rx {
            let packets = match rtcp::parse_compound(&packet.payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed RTCP compound packet");
                    continue;
                }
            };
            for p in packets {
                if let rtcp::RtcpPacket::SenderReport(sr) = p {
                    inner.session.record_sender_report(kind, sr.ntp_as_f64(), sr.rtp_timestamp);
                    let rr = rtcp::empty_receiver_report(inner.our_ssrc);
                    if let Err(e) = transport.lock().write_control(&rr) {
                        tracing::debug!(error = %e, "failed to send receiver report");
                    }
                }
            }
        }
    });
}

fn spawn_keepalive(inner: Arc<Inner>) {
    inner.keepalive_running.store(true, Ordering::SeqCst);
    thread::spawn(move || {
        while inner.keepalive_running.load(Ordering::SeqCst) {
            let interval = inner.session.keepalive_interval();
            thread::sleep(interval);
            if !inner.keepalive_running.load(Ordering::SeqCst) {
                break;
            }
            let use_get_parameter = inner.supports_get_parameter.load(Ordering::SeqCst);
            let result = if use_get_parameter {
                let base_uri = inner.session.base_uri();
                inner.send_request(Method::GetParameter, Some(&base_uri), &[], Vec::new(), PurposeTag::Keepalive)
            } else {
                inner.send_request(Method::Options, None, &[], Vec::new(), PurposeTag::Keepalive)
            };
            match result {
                Ok(resp) if resp.is_unauthorized() => {
                    tracing::debug!("keepalive received 401, deferring re-auth to next user request");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "keepalive request failed, ending session");
                    inner.session.set_phase(SessionPhase::TornDown);
                    let _ = inner.events.send(ClientEvent::StreamingFinished { reason: Some(e.to_string()) });
                    break;
                }
            }
        }
    });
}

impl Inner {
    fn listener(&self) -> Result<Arc<Listener>> {
        self.listener.lock().clone().ok_or(RtspError::SessionClosed)
    }

    fn apply_auth(&self, req: &mut RtspRequest) {
        let challenge = self.challenge.lock().clone();
        if let (Some(challenge), Some(creds)) = (challenge, &self.config.credentials) {
            let auth = challenge.authorize(creds, req.method.as_str(), req.request_uri_str(), &req.body);
            req.headers.insert("Authorization", auth);
        }
    }

    /// Send a request and, on a `401` to a [`PurposeTag::UserRequest`],
    /// re-authenticate from the fresh challenge and retry exactly once
    /// (spec.md §4.6, §7, §8 invariant 3).
    fn send_request(
        &self,
        method: Method,
        uri: Option<&str>,
        headers: &[(&str, &str)],
        body: Vec<u8>,
        purpose: PurposeTag,
    ) -> Result<crate::protocol::RtspResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RtspError::SessionClosed);
        }
        let listener = self.listener()?;

        let mut req = RtspRequest::new(method, uri.map(|s| s.to_string()));
        req.body = body;
        if let Some(id) = self.session.id() {
            req.headers.insert("Session", id);
        }
        for (name, value) in headers.iter().copied() {
            req.headers.insert(name, value);
        }
        self.apply_auth(&mut req);
        let had_auth = req.headers.contains("Authorization");
        let retry_template = req.clone_for_resend();

        let resp = listener.request(req)?;

        if resp.status_code == 401 {
            if purpose == PurposeTag::Keepalive {
                return Ok(resp);
            }
            if had_auth {
                return Err(RtspError::AuthenticationFailed(
                    "credentials rejected a second time".into(),
                ));
            }
            let challenge_header = resp
                .headers
                .get("WWW-Authenticate")
                .ok_or_else(|| RtspError::AuthenticationFailed("401 without WWW-Authenticate".into()))?;
            let challenge = Challenge::parse(challenge_header)?;
            *self.challenge.lock() = Some(challenge);

            let mut retry = retry_template;
            self.apply_auth(&mut retry);
            let retry_resp = listener.request(retry)?;
            if retry_resp.status_code == 401 {
                return Err(RtspError::AuthenticationFailed("credentials rejected".into()));
            }
            return Ok(retry_resp);
        }

        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_mask_matches_requested_kinds() {
        assert!(MediaMask::Both.wants(MediaKind::Video));
        assert!(MediaMask::Both.wants(MediaKind::Audio));
        assert!(MediaMask::Video.wants(MediaKind::Video));
        assert!(!MediaMask::Video.wants(MediaKind::Audio));
        assert!(MediaMask::Audio.wants(MediaKind::Audio));
        assert!(!MediaMask::Audio.wants(MediaKind::Video));
    }

    #[test]
    fn static_payload_types_cover_g711_and_jpeg() {
        assert_eq!(static_payload_type(0), Some(("PCMU", 8000)));
        assert_eq!(static_payload_type(8), Some(("PCMA", 8000)));
        assert_eq!(static_payload_type(26), Some(("JPEG", 90000)));
        assert_eq!(static_payload_type(96), None);
    }

    #[test]
    fn session_header_parses_id_and_timeout() {
        let (id, timeout) = parse_session_header("66334873;timeout=60");
        assert_eq!(id, "66334873");
        assert_eq!(timeout, Some(60));

        let (id, timeout) = parse_session_header("66334873");
        assert_eq!(id, "66334873");
        assert_eq!(timeout, None);
    }

    /// spec.md §8 S6: a `401` answering a keepalive request must come back
    /// to the caller as an ordinary response, not an error, so the ticker
    /// can shrug it off instead of tearing the session down.
    #[test]
    fn keepalive_401_is_returned_instead_of_erroring() {
        let tcp_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = tcp_listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            use std::io::{Read, Write};
            let (mut stream, _) = tcp_listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).unwrap();
            stream
                .write_all(
                    b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\n\
                      WWW-Authenticate: Digest realm=\"cam\", nonce=\"xyz\"\r\n\r\n",
                )
                .unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let (listener, _data_rx) = Listener::spawn(stream, Duration::from_secs(2)).unwrap();

        let (events_tx, _events_rx) = mpsc::channel();
        let inner = Inner {
            config: ClientConfig::default(),
            session: Session::new("rtsp://h/s".into(), false),
            listener: Mutex::new(Some(listener)),
            challenge: Mutex::new(None),
            events: events_tx,
            video_runtime: Mutex::new(None),
            audio_runtime: Mutex::new(None),
            channel_routes: Mutex::new(HashMap::new()),
            next_interleaved_channel: AtomicU8::new(0),
            supports_get_parameter: AtomicBool::new(false),
            keepalive_running: Arc::new(AtomicBool::new(false)),
            our_ssrc: 1,
            closed: AtomicBool::new(false),
        };

        let resp = inner
            .send_request(Method::GetParameter, None, &[], Vec::new(), PurposeTag::Keepalive)
            .expect("a 401 on a keepalive request must not surface as an Err");
        assert_eq!(resp.status_code, 401);

        server.join().unwrap();
    }
}

use std::time::Duration;

use clap::Parser;
use rtsp_client::auth::Credentials;
use rtsp_client::client::{ClientConfig, ClientEvent, MediaMask, TransportPreference};
use rtsp_client::Client;

#[derive(Parser)]
#[command(name = "rtsp-client", about = "Demo RTSP client: connects, plays, prints stream events")]
struct Args {
    /// RTSP URL, e.g. rtsp://192.168.1.10/stream1
    url: String,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long, value_enum, default_value_t = TransportArg::Udp)]
    transport: TransportArg,

    #[arg(long, value_enum, default_value_t = MediaArg::Both)]
    media: MediaArg,

    /// Treat this as a recorded-media playback session (onvif-replay).
    #[arg(long)]
    playback: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum TransportArg {
    Udp,
    Tcp,
    Multicast,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum MediaArg {
    Video,
    Audio,
    Both,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let credentials = match (args.username, args.password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    };

    let config = ClientConfig {
        url: args.url.clone(),
        credentials,
        transport_preference: match args.transport {
            TransportArg::Udp => TransportPreference::Udp,
            TransportArg::Tcp => TransportPreference::Tcp,
            TransportArg::Multicast => TransportPreference::Multicast,
        },
        media_mask: match args.media {
            MediaArg::Video => MediaMask::Video,
            MediaArg::Audio => MediaMask::Audio,
            MediaArg::Both => MediaMask::Both,
        },
        playback_session: args.playback,
        io_timeout: Duration::from_secs(10),
        ..Default::default()
    };

    let (client, events) = Client::new(config);
    if let Err(e) = client.connect() {
        eprintln!("failed to start connecting to {}: {e}", args.url);
        return;
    }

    let mut playing = false;
    for event in events {
        match event {
            ClientEvent::SetupMessageCompleted => {
                tracing::info!("session negotiated, sending PLAY");
                if !playing {
                    if let Err(e) = client.play() {
                        eprintln!("PLAY failed: {e}");
                        break;
                    }
                    playing = true;
                }
            }
            ClientEvent::NewVideoStream { codec_name, config } => {
                tracing::info!(codec_name, config_len = config.len(), "video stream started");
            }
            ClientEvent::NewAudioStream { codec_name, config } => {
                tracing::info!(codec_name, config_len = config.len(), "audio stream started");
            }
            ClientEvent::ReceivedVideoData { data, wall_clock } => {
                tracing::debug!(bytes = data.len(), ?wall_clock, "video frame");
            }
            ClientEvent::ReceivedAudioData { data, wall_clock } => {
                tracing::debug!(bytes = data.len(), ?wall_clock, "audio frame");
            }
            ClientEvent::StreamingFinished { reason } => {
                tracing::info!(?reason, "session ended");
                break;
            }
        }
    }

    client.stop();
}

use std::error::Error;
use std::time::Duration;
use rtspio::av::{FrameKind, RawFrame};
use rtspio::config::{self, ConnectionParameters};
use rtspio::format::rtsp::RTSPClient;
use tokio_util::sync::CancellationToken;

fn describe(frame: &RawFrame) -> String {
    match &frame.kind {
        FrameKind::H264IFrame { .. } => "H.264 keyframe".to_string(),
        FrameKind::H264PFrame => "H.264 frame".to_string(),
        FrameKind::H265IFrame { .. } => "H.265 keyframe".to_string(),
        FrameKind::H265PFrame => "H.265 frame".to_string(),
        FrameKind::JPEG => "JPEG".to_string(),
        FrameKind::AAC { .. } => "AAC".to_string(),
        FrameKind::G711A { sample_rate, .. } => format!("G.711 A-law {} Hz", sample_rate),
        FrameKind::G711U { sample_rate, .. } => format!("G.711 mu-law {} Hz", sample_rate),
        FrameKind::G726 { sample_rate, .. } => format!("G.726 {} Hz", sample_rate),
        FrameKind::PCM { sample_rate, .. } => format!("PCM {} Hz", sample_rate),
        FrameKind::OnvifMetadata => "ONVIF metadata".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // URL from the command line, otherwise from config.toml / RTSPIO_URL
    let config = config::get();
    let params = match std::env::args().nth(1) {
        Some(url) => ConnectionParameters::new(&url)?.with_transport(config.transport),
        None => config.connection_parameters()?,
    };

    println!(
        "Connecting to {} over {:?}",
        params.connection_uri, params.rtp_transport
    );
    let mut client = RTSPClient::new(params, |frame: RawFrame| {
        println!(
            "{} {:>7} bytes  {}",
            frame.timestamp.format("%H:%M:%S%.3f"),
            frame.data.len(),
            describe(&frame)
        );
    });

    let token = CancellationToken::new();
    let stopper = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        println!("Stopping...");
        stopper.cancel();
    });

    client.connect(&token).await?;
    println!("Playing, press Ctrl+C to stop");

    loop {
        match client.receive(&token).await {
            Ok(()) => {
                println!("Server closed the session");
                break;
            }
            Err(e) if token.is_cancelled() => {
                println!("Stopped: {}", e);
                break;
            }
            Err(e) if e.is_transient() => {
                println!("Stream interrupted: {}, reconnecting in 5 seconds", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                if let Err(e) = client.connect(&token).await {
                    println!("Reconnect failed: {}", e);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

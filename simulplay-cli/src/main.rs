//! SimulPlay - command line runner
//!
//! Binds two players to a sync controller and keeps them together until
//! Ctrl-C.
//!
//! Usage:
//!   SIMULPLAY_VIDEO_URL=... SIMULPLAY_AUDIO_URL=... cargo run --release
//!   cargo run --release -- --simulate  # Two in-process players, one with a fast clock

mod config;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use simulplay_core::{
    PlaybackClient, Player, PositionUnit, RemotePlayer, RemotePlayerConfig, SimConfig, SimulatedPlayer,
    SyncController,
};
use tracing::{info, warn};

use config::{CliConfig, EndpointConfig};

/// How long to wait for both players to become ready before starting anyway
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between status log lines
const STATUS_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    let simulate = args.iter().any(|a| a == "--simulate");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("simulplay=info".parse()?)
                .add_directive("simulplay_core=debug".parse()?)
                .add_directive("hyper_util=off".parse()?)
                .add_directive("reqwest=off".parse()?),
        )
        .init();

    let config = CliConfig::from_env(simulate)?;

    let (video, audio, ready): (Arc<dyn Player>, Arc<dyn Player>, Box<dyn Fn() -> bool>) = if simulate {
        let (video, audio) = simulated_pair();
        let (v, a) = (Arc::clone(&video), Arc::clone(&audio));
        (video, audio, Box::new(move || v.is_ready() && a.is_ready()))
    } else {
        let video = remote_player("video", &config.video.endpoint)?;
        let audio = remote_player("audio", &config.audio.endpoint)?;
        let (v, a) = (Arc::clone(&video), Arc::clone(&audio));
        (video, audio, Box::new(move || v.is_ready() && a.is_ready()))
    };

    let controller = SyncController::new(Arc::clone(&video), Arc::clone(&audio), config.sync_config());

    // Buffered by each player until it is ready
    if let Some(item) = &config.video.item {
        video.load(item);
    }
    if let Some(item) = &config.audio.item {
        audio.load(item);
    }

    if tokio::time::timeout(READY_TIMEOUT, wait_until(ready)).await.is_err() {
        warn!("Players not ready after {:?}, starting anyway", READY_TIMEOUT);
    }

    controller.play();
    controller.start();
    info!("Syncing, press Ctrl-C to stop");

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = status.tick() => {
                let (v, a) = (video.current_time(), audio.current_time());
                info!(
                    video_s = format!("{v:.2}"),
                    video_state = %video.state(),
                    audio_s = format!("{a:.2}"),
                    audio_state = %audio.state(),
                    drift_s = format!("{:.2}", (v - a).abs()),
                    "Status"
                );
            }
        }
    }

    controller.stop();
    info!("Stopped");
    Ok(())
}

async fn wait_until(check: Box<dyn Fn() -> bool>) {
    while !check() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn remote_player(label: &str, endpoint: &Option<EndpointConfig>) -> Result<Arc<RemotePlayer>, Box<dyn Error>> {
    let endpoint = endpoint
        .as_ref()
        .ok_or_else(|| format!("no endpoint configured for {label}"))?;

    let mut client = PlaybackClient::new(endpoint.base_url.clone())?;
    if let Some(token) = &endpoint.token {
        client = client.with_token(token.clone());
    }

    Ok(RemotePlayer::spawn(
        label,
        client,
        RemotePlayerConfig::default().with_unit(endpoint.unit),
    ))
}

/// Two simulated players: the audio one runs 5% fast, reports late and
/// becomes ready after the video one
fn simulated_pair() -> (Arc<SimulatedPlayer>, Arc<SimulatedPlayer>) {
    let video = SimulatedPlayer::new("video", SimConfig::default().with_duration(600.0));
    let audio = SimulatedPlayer::new(
        "audio",
        SimConfig::default()
            .with_unit(PositionUnit::Millis)
            .with_clock_rate(1.05)
            .with_notify_delay(Duration::from_millis(80), Duration::from_millis(120))
            .with_duration(600.0),
    );

    for (player, delay) in [(Arc::clone(&video), 300), (Arc::clone(&audio), 700)] {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            player.mark_ready();
        });
    }

    // Someone pokes the players' own controls now and then
    let (v, a) = (Arc::clone(&video), Arc::clone(&audio));
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        info!("Simulating a pause on the audio player");
        a.simulate_user_pause();
        tokio::time::sleep(Duration::from_secs(3)).await;
        info!("Simulating a play on the video player");
        v.simulate_user_play();
    });

    (video, audio)
}

//! Application entry point: voice-agent client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (default on first run); an optional first
//!    argument overrides the server URL.
//! 3. Create the [`tokio`] runtime.
//! 4. Build the cpal-backed capture controller, the WebSocket connector and
//!    the playback hand-off.
//! 5. Spawn the session controller, a playback drain and an update reporter.
//! 6. Start the session; stop on Ctrl-C and print the latency summary.

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use voice_agent_client::{
    audio::{CaptureController, ChannelPlayback, CpalDevice, PlaybackCommand},
    config::AppConfig,
    session::{SessionController, SessionUpdate, WsConnector},
    turn::{LatencyMetric, LatencyStats},
};

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-agent client starting up");

    // 2. Configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });
    if let Some(url) = std::env::args().nth(1) {
        config.server.url = url;
    }

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    // 4. Collaborators
    let capture = CaptureController::new(
        CpalDevice::new(config.audio.input_device.clone()),
        config.audio.constraints(),
    );
    let (playback, mut playback_rx) = ChannelPlayback::new();

    let (controller, handle) =
        SessionController::new(&config, Box::new(WsConnector), capture, Box::new(playback));

    // 5. Tasks
    let controller_task = tokio::spawn(controller.run());

    tokio::spawn(async move {
        let mut received = 0usize;
        while let Some(cmd) = playback_rx.recv().await {
            match cmd {
                PlaybackCommand::Audio(bytes) => {
                    received += bytes.len();
                    log::debug!("playback: {} bytes queued", bytes.len());
                }
                PlaybackCommand::Stop => {
                    log::debug!("playback: stopped after {received} bytes");
                    received = 0;
                }
            }
        }
    });

    let mut updates = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => report(&update),
                Err(RecvError::Lagged(n)) => log::warn!("{n} session updates skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 6. Session
    log::info!("Connecting to {} (Ctrl-C to stop)", config.server.url);
    handle.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    handle.stop().await?;
    drop(handle);

    let controller = controller_task
        .await
        .context("session controller panicked")?;
    print_summary(controller.core().latency());
    Ok(())
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

fn report(update: &SessionUpdate) {
    match update {
        SessionUpdate::Session(state) => {
            log::info!("status: {} ({:.1} s)", state.status.label(), state.elapsed)
        }
        SessionUpdate::Waterfall(Some(turn)) => log::info!(
            "turn: \"{}\" -> \"{}\"",
            turn.transcript,
            turn.response
        ),
        SessionUpdate::Activity(item) => {
            log::info!("[{:?}] {}: {}", item.kind, item.label, item.text)
        }
        // Log lines are already written by the session core.
        SessionUpdate::Log(_) => {}
        SessionUpdate::Turn(_) | SessionUpdate::Waterfall(None) | SessionUpdate::Latency(_) => {}
    }
}

fn print_summary(stats: &LatencyStats) {
    println!("Turns: {}", stats.turns);
    for (name, metric) in [
        ("stt", LatencyMetric::Stt),
        ("agent", LatencyMetric::Agent),
        ("tts", LatencyMetric::Tts),
        ("total", LatencyMetric::Total),
    ] {
        match stats.summary(metric) {
            Some(s) => println!(
                "  {name:<6} n={:<3} mean={:>7.1} ms  min={:>7.1} ms  max={:>7.1} ms",
                s.count, s.mean, s.min, s.max
            ),
            None => println!("  {name:<6} n=0"),
        }
    }
}

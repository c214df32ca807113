//! Audio Streamer (audio-streamer) - Main entry point
//!
//! Streams a list of audio files, in order, through the decode pipeline into a
//! loopback session that writes the resulting raw PCM to an output file.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use audio_streamer::audio::DecoderCapability;
use audio_streamer::config::{ConfigOverrides, TomlConfig};
use audio_streamer::events::StreamEvent;
use audio_streamer::transport::{LoopbackSession, ServiceState};
use audio_streamer::StreamManager;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the audio service to acknowledge a start or stop request
const SERVICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line arguments for audio-streamer
#[derive(Parser, Debug)]
#[command(name = "audio-streamer")]
#[command(about = "Decode audio files and stream them as PCM")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "AUDIO_STREAMER_CONFIG")]
    config: Option<PathBuf>,

    /// Output sample rate (8KHZ, 16KHZ, 22KHZ, 44KHZ)
    #[arg(long, env = "AUDIO_STREAMER_SAMPLE_RATE")]
    sample_rate: Option<String>,

    /// Output bits per sample (8 or 16)
    #[arg(long, env = "AUDIO_STREAMER_BITS")]
    bits: Option<u8>,

    /// Decode strategy (codec or compat)
    #[arg(long, env = "AUDIO_STREAMER_DECODER")]
    decoder: Option<DecoderCapability>,

    /// Request an encrypted audio service
    #[arg(long, env = "AUDIO_STREAMER_ENCRYPTED")]
    encrypted: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "AUDIO_STREAMER_LOG_LEVEL")]
    log_level: Option<String>,

    /// File receiving the raw PCM stream
    #[arg(short, long)]
    output: PathBuf,

    /// Audio files to stream, in playback order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = match &args.config {
        Some(path) => TomlConfig::load(path)
            .await
            .context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };
    let config = toml_config.apply_overrides(ConfigOverrides {
        sample_rate: args.sample_rate.clone(),
        bits_per_sample: args.bits,
        decoder: args.decoder,
        encrypted: args.encrypted,
        log_level: args.log_level.clone(),
    });

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("audio_streamer={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting audio-streamer with {} file(s)", args.files.len());
    info!("Output: {}", args.output.display());

    let output = File::create(&args.output)
        .with_context(|| format!("Failed to create output file {}", args.output.display()))?;
    let session = Arc::new(LoopbackSession::to_writer(Box::new(BufWriter::new(output))));

    let manager = StreamManager::configure(session.clone(), &config.stream)
        .context("Failed to configure stream")?;
    info!("Output format: {}", manager.format());

    let reporter = tokio::spawn(report_events(manager.subscribe()));

    let mut state = manager.service_state();
    manager.start_service(config.stream.encrypted);
    tokio::time::timeout(
        SERVICE_TIMEOUT,
        state.wait_for(|s| *s == ServiceState::Active),
    )
    .await
    .context("Timed out waiting for the audio service to start")?
    .context("Audio service state channel closed")?;

    for file in &args.files {
        manager
            .submit(file.clone())
            .with_context(|| format!("Failed to queue {}", file.display()))?;
    }

    tokio::select! {
        _ = manager.wait_idle() => {
            info!("All files processed");
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping");
        }
    }

    manager.stop_service();
    if tokio::time::timeout(
        SERVICE_TIMEOUT,
        state.wait_for(|s| *s == ServiceState::Stopped),
    )
    .await
    .is_err()
    {
        warn!("Audio service did not acknowledge the stop request");
    }

    info!(
        "Streamed {} buffers ({} bytes), dropped {}",
        manager.delivered_buffers(),
        session.bytes_written(),
        manager.dropped_buffers()
    );

    // Dropping the manager closes the event bus and ends the reporter, unless a
    // decode interrupted by Ctrl+C still holds the queue
    drop(manager);
    let failures = match tokio::time::timeout(Duration::from_secs(1), reporter).await {
        Ok(joined) => joined.context("Event reporter task failed")?,
        Err(_) => {
            warn!("Decode still in progress at shutdown; not all failures were reported");
            0
        }
    };

    if failures > 0 {
        bail!("{} of {} file(s) failed to decode", failures, args.files.len());
    }

    info!("Shutdown complete");
    Ok(())
}

/// Log pipeline events until the bus closes; returns the number of failed jobs
async fn report_events(mut rx: tokio::sync::broadcast::Receiver<StreamEvent>) -> usize {
    let mut failures = 0;

    loop {
        match rx.recv().await {
            Ok(StreamEvent::ServiceEnded { requested: false }) => {
                warn!("Audio service ended by the remote side");
            }
            Ok(event) => {
                if let Some(err) = event.error() {
                    if matches!(event, StreamEvent::JobFailed { .. }) {
                        failures += 1;
                    }
                    error!("{}", err);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event reporter lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    failures
}

//! camlink - Main entry point
//!
//! Runs one bridge pipeline from a frame source (synthetic tone or raw
//! G.711 file) to an output (audio device or WAV file) until the source
//! ends, the duration elapses, or Ctrl+C / SIGTERM arrives. A JSON stats
//! snapshot is printed on exit.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use camlink_bridge::audio::{ClockedBackend, Codec, CpalBackend, OutputBackend};
use camlink_bridge::config::BridgeConfig;
use camlink_bridge::source::{EncodedAudioSource, FileSource, SourcePump, ToneSource};
use camlink_bridge::Pipeline;
use camlink_common::PipelineState;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

/// Where frames come from
#[derive(Debug, Clone)]
enum SourceSpec {
    Tone,
    File(PathBuf),
}

impl FromStr for SourceSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "tone" => Ok(SourceSpec::Tone),
            Some(("file", path)) if !path.is_empty() => Ok(SourceSpec::File(PathBuf::from(path))),
            _ => Err(format!("invalid source '{}' (expected tone or file:<path>)", s)),
        }
    }
}

/// Where audio goes
#[derive(Debug, Clone)]
enum OutputSpec {
    Device,
    Wav(PathBuf),
    /// Clocked render with no recording
    Null,
}

impl FromStr for OutputSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "device" => Ok(OutputSpec::Device),
            None if s == "null" => Ok(OutputSpec::Null),
            Some(("wav", path)) if !path.is_empty() => Ok(OutputSpec::Wav(PathBuf::from(path))),
            _ => Err(format!(
                "invalid output '{}' (expected device, null or wav:<path>)",
                s
            )),
        }
    }
}

/// Command-line arguments for camlink
#[derive(Parser, Debug)]
#[command(name = "camlink")]
#[command(about = "Bridge a camera's G.711 voice stream to a local audio output")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct Args {
    /// Config file (overrides CAMLINK_CONFIG and the per-user location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame source: tone | file:<path>
    #[arg(short, long, default_value = "tone")]
    source: SourceSpec,

    /// Output: device | null | wav:<path>
    #[arg(short, long, default_value = "device", env = "CAMLINK_OUTPUT")]
    output: OutputSpec,

    /// Output device name (overrides [output].device)
    #[arg(long, env = "CAMLINK_DEVICE")]
    device: Option<String>,

    /// Companding law of the source (overrides [audio].codec)
    #[arg(long)]
    codec: Option<Codec>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Log level or EnvFilter directive (overrides [logging].level)
    #[arg(long, env = "CAMLINK_LOG")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(device) = &args.device {
        config.output.device = Some(device.clone());
    }
    if let Some(codec) = args.codec {
        config.audio.codec = codec;
    }

    camlink_common::logging::init(&config.logging).context("Failed to initialise logging")?;

    info!(
        "Starting camlink {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let backend: Box<dyn OutputBackend> = match &args.output {
        OutputSpec::Device => Box::new(CpalBackend::new(config.output.device.clone())),
        OutputSpec::Wav(path) => Box::new(ClockedBackend::with_wav_output(path)),
        OutputSpec::Null => Box::new(ClockedBackend::new()),
    };

    let pipeline = Arc::new(Pipeline::new(config.pipeline_config(), backend));
    pipeline.start().context("Failed to start audio output")?;

    let source = build_source(&args.source, &config)?;
    let pump = SourcePump::spawn(source, Arc::clone(&pipeline)).context("Failed to start frame source")?;

    // Only the signal handlers and timers need a runtime; the pipeline runs
    // on its own threads.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(wait_for_exit(&pipeline, &pump, args.duration_secs));

    let pump_result = pump.stop();

    let snapshot = pipeline.stats();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    let failure = pipeline.failure();
    pipeline.stop().context("Failed to stop pipeline")?;

    match pump_result {
        Ok(summary) => info!(
            "Source finished: {} frames pushed, {} discarded",
            summary.frames_pushed, summary.frames_discarded
        ),
        Err(e) => warn!("Source stopped with error: {}", e),
    }

    if let Some(err) = failure {
        return Err(anyhow!(err));
    }

    info!("Shutdown complete");
    Ok(())
}

fn build_source(spec: &SourceSpec, config: &BridgeConfig) -> Result<Box<dyn EncodedAudioSource>> {
    let rate = config.audio.source_sample_rate;
    let frame_bytes = config.source.frame_bytes;
    let interval = config.frame_interval();

    Ok(match spec {
        SourceSpec::Tone => {
            let mut tone = ToneSource::new(
                config.audio.codec,
                config.source.tone_frequency_hz,
                rate,
                frame_bytes,
            );
            if let Some(interval) = interval {
                tone = tone.with_frame_interval(interval);
            }
            Box::new(tone)
        }
        SourceSpec::File(path) => {
            let mut file = FileSource::open(path, frame_bytes, rate)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            if let Some(interval) = interval {
                file = file.with_frame_interval(interval);
            }
            Box::new(file)
        }
    })
}

/// Resolve when the run should end
async fn wait_for_exit(pipeline: &Pipeline, pump: &SourcePump, duration_secs: Option<u64>) {
    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    let finished = async {
        let mut poll = tokio::time::interval(Duration::from_millis(100));
        loop {
            poll.tick().await;
            if pipeline.state() == PipelineState::Failed {
                warn!("Pipeline failed; exiting");
                break;
            }
            // Let the tail of a finished source play out
            if pump.is_finished() && pipeline.stats().buffered_samples == 0 {
                info!("Source drained");
                break;
            }
        }
    };

    tokio::select! {
        _ = shutdown_signal() => {},
        _ = deadline => info!("Duration elapsed, shutting down"),
        _ = finished => {},
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

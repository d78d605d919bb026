use std::thread;
use std::time::{Duration, Instant};

use band_meter_core::{AudioEngine, CaptureMode, LevelAdapter};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> band_meter_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Live { mode, seconds } => run_live(mode, seconds),
        Commands::Devices => run_devices(),
    }
}

fn run_live(mode: CaptureMode, seconds: Option<u64>) -> band_meter_core::Result<()> {
    tracing::info!(%mode, "starting live capture");

    let mut adapter = LevelAdapter::new(AudioEngine::new());
    adapter.start(mode)?;

    let started = Instant::now();
    while adapter.is_running() {
        if let Some(limit) = seconds {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }

        let levels = adapter.levels();
        tracing::info!(
            bass = levels.bass,
            mid = levels.mid,
            treble = levels.treble,
            volume = levels.volume,
            "levels"
        );
        thread::sleep(Duration::from_millis(250));
    }

    adapter.stop();
    Ok(())
}

fn run_devices() -> band_meter_core::Result<()> {
    let names = band_meter_core::list_input_devices()?;
    if names.is_empty() {
        tracing::info!("no capture devices available");
        return Ok(());
    }
    for (index, name) in names.iter().enumerate() {
        tracing::info!("{index}: {name}");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time audio band level meter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture live audio and log the derived band levels.
    Live {
        /// Capture endpoint: "mic" or "system".
        #[arg(short, long, default_value = "mic")]
        mode: CaptureMode,
        /// Stop automatically after this many seconds.
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// List the capture devices the host exposes.
    Devices,
}

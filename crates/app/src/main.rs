use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use soundtrap_audio::{open_input, open_monitor, DeviceCatalog};
use soundtrap_capture::{
    AudioSink, CaptureConfig, CaptureEngine, CaptureLoop, CaptureSettings, CaptureStats,
    PersistenceQueue, WavStorage, DEFAULT_QUEUE_CAPACITY, DEFAULT_SUBMIT_TIMEOUT,
};
use soundtrap_foundation::{AppError, AudioFormat, PersistenceError, ShutdownHandler};
use soundtrap_loudness::LoudnessConfig;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "soundtrap")]
#[command(version)]
#[command(
    about = "Sound-activated recorder: listens on an input device and saves a WAV file for every loud event, pre-roll included"
)]
struct Cli {
    /// Input device to listen on
    #[arg(short = 'i', long = "input", required_unless_present = "list_devices")]
    input: Option<String>,

    /// Output device for live monitoring passthrough
    #[arg(short = 'm', long = "monitor")]
    monitor: Option<String>,

    /// Loudness threshold as a percent of full scale
    #[arg(short = 't', long = "threshold", default_value_t = 5.0)]
    threshold: f32,

    /// Seconds of audio to keep from before each trigger
    #[arg(short = 'p', long = "pre-roll-seconds", default_value_t = 1)]
    pre_roll_seconds: u32,

    /// Cap on the recorded tail after the pre-roll, in seconds
    #[arg(long = "max-seconds", default_value_t = 5)]
    max_seconds: u32,

    /// Seconds of sustained quiet that end a capture
    #[arg(short = 'a', long = "quiet-seconds", default_value_t = 1)]
    quiet_seconds: u32,

    /// Directory to write captures into
    #[arg(short = 'f', long = "output-dir", default_value = ".")]
    output_dir: PathBuf,

    /// Continuously display the current loudness percent
    #[arg(short = 'd', long = "show-loudness")]
    show_loudness: bool,

    /// List available devices and exit
    #[arg(long = "list-devices")]
    list_devices: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stderr, so the interactive loudness meter owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_device_lists(catalog: &DeviceCatalog) {
    println!("Available input devices:");
    for name in catalog.input_device_names() {
        println!("  - {name}");
    }
    println!();
    println!("Available monitor devices:");
    for name in catalog.output_device_names() {
        println!("  - {name}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let catalog = DeviceCatalog::new();

    if cli.list_devices {
        print_device_lists(&catalog);
        return ExitCode::SUCCESS;
    }

    match run(cli, &catalog).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Config(err)) => {
            eprintln!("configuration error: {err}");
            eprintln!();
            print_device_lists(&catalog);
            ExitCode::from(2)
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, catalog: &DeviceCatalog) -> Result<(), AppError> {
    let input_name = cli
        .input
        .as_deref()
        .expect("clap requires --input unless --list-devices");

    let settings = CaptureSettings {
        format: AudioFormat::default(),
        loudness: LoudnessConfig {
            threshold_percent: cli.threshold,
        },
        pre_roll_seconds: cli.pre_roll_seconds,
        max_capture_seconds: cli.max_seconds,
        quiet_period_seconds: cli.quiet_seconds,
    };
    let config = CaptureConfig::derive(&settings)?;
    tracing::info!(
        chunk_bytes = config.chunk_bytes(),
        listening_buffer_bytes = config.listening_buffer_bytes(),
        capture_buffer_bytes = config.capture_buffer_bytes(),
        threshold_percent = config.threshold_percent(),
        "derived capture parameters"
    );

    std::fs::create_dir_all(&cli.output_dir).map_err(PersistenceError::Io)?;

    let shutdown = ShutdownHandler::new().install().await;

    let input_device = catalog.open_input(input_name)?;
    let (_input_stream, source) = open_input(&input_device, &settings.format, config.chunk_bytes())?;

    let mut monitor_stream = None;
    let mut monitor_sink: Option<Box<dyn AudioSink>> = None;
    if let Some(name) = &cli.monitor {
        let device = catalog.open_output(name)?;
        let (stream, sink) = open_monitor(&device, &settings.format, config.chunk_bytes())?;
        monitor_stream = Some(stream);
        monitor_sink = Some(Box::new(sink));
    }

    let queue = PersistenceQueue::spawn(
        Box::new(WavStorage),
        cli.output_dir.clone(),
        DEFAULT_QUEUE_CAPACITY,
        DEFAULT_SUBMIT_TIMEOUT,
    )?;

    let stats = Arc::new(CaptureStats::default());
    let engine = CaptureEngine::new(config)?;
    let capture = CaptureLoop::spawn(
        engine,
        Box::new(source),
        monitor_sink,
        queue.handle(),
        shutdown.flag(),
        Arc::clone(&stats),
        cli.show_loudness,
    )?;

    tracing::info!(output_dir = %cli.output_dir.display(), "listening; press Ctrl-C to stop");

    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));
    heartbeat.tick().await; // the first tick completes immediately
    let mut poll = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                break;
            }
            _ = heartbeat.tick() => {
                tracing::info!(
                    chunks = stats.chunks_processed.load(Ordering::Relaxed),
                    captures = stats.captures_completed.load(Ordering::Relaxed),
                    "still listening"
                );
            }
            _ = poll.tick() => {
                if capture.is_finished() {
                    break;
                }
            }
        }
    }

    // Cooperative teardown: stop the loop, then the device streams, then
    // flush pending saves. The queue is drained even when the loop failed,
    // so completed captures are never lost to a dying device.
    shutdown.request_shutdown();
    let capture_result = capture.join();
    drop(monitor_stream);

    if !queue.shutdown(DRAIN_TIMEOUT) {
        tracing::warn!("some captures may not have been saved");
    }
    if cli.show_loudness {
        println!();
    }
    tracing::info!(
        chunks = stats.chunks_processed.load(Ordering::Relaxed),
        captures_started = stats.captures_started.load(Ordering::Relaxed),
        captures_completed = stats.captures_completed.load(Ordering::Relaxed),
        events_dropped = stats.events_dropped.load(Ordering::Relaxed),
        "recorder stopped"
    );

    capture_result.map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let cli = Cli::parse_from(["soundtrap", "-i", "pulse"]);
        assert_eq!(cli.input.as_deref(), Some("pulse"));
        assert_eq!(cli.threshold, 5.0);
        assert_eq!(cli.pre_roll_seconds, 1);
        assert_eq!(cli.max_seconds, 5);
        assert_eq!(cli.quiet_seconds, 1);
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert!(!cli.show_loudness);
        assert!(cli.monitor.is_none());
    }

    #[test]
    fn list_devices_does_not_require_an_input() {
        let cli = Cli::parse_from(["soundtrap", "--list-devices"]);
        assert!(cli.list_devices);
        assert!(cli.input.is_none());
    }
}

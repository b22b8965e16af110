//! Subtitle Reader - Main entry point
//!
//! Tracks the subtitles of a page snapshot file and reads new captions aloud.
//!
//! # Usage
//!
//! ```bash
//! # Follow a page snapshot with the saved configuration
//! subtitle-reader --page /tmp/page.json
//!
//! # Override the expression and interval
//! subtitle-reader --page /tmp/page.json --expression "ytp-caption-segment" --interval 250
//!
//! # Parse and speak once, then exit
//! subtitle-reader --page /tmp/page.json --once
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subtitle_reader::{
    AutoReadScheduler, CommandSpeechEngine, ConfigStore, FileConfigStore, LogSpeechEngine,
    ReaderEvent, SnapshotFilePage, SpeechEngine, TrackingEngine,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command line options
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    page_path: Option<PathBuf>,
    expression: Option<String>,
    interval_ms: Option<u64>,
    video_volume: Option<f32>,
    once: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("Subtitle Reader v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    cli.config_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--page" | "-p" => {
                i += 1;
                if i < args.len() {
                    cli.page_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--expression" | "-e" => {
                i += 1;
                if i < args.len() {
                    cli.expression = Some(args[i].clone());
                }
            }
            "--interval" => {
                i += 1;
                if i < args.len() {
                    match args[i].parse() {
                        Ok(interval) => cli.interval_ms = Some(interval),
                        Err(_) => eprintln!("Ignoring invalid interval: {}", args[i]),
                    }
                }
            }
            "--video-volume" => {
                i += 1;
                if i < args.len() {
                    match args[i].parse() {
                        Ok(volume) => cli.video_volume = Some(volume),
                        Err(_) => eprintln!("Ignoring invalid video volume: {}", args[i]),
                    }
                }
            }
            "--once" => {
                cli.once = true;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Use --help for usage information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn print_help() {
    println!(
        r#"Subtitle Reader - Reads live subtitles aloud

USAGE:
    subtitle-reader --page <FILE> [OPTIONS]

OPTIONS:
    -h, --help               Show this help message
    -v, --version            Show version
    -c, --config <FILE>      Configuration file (default: per-user config dir)
    -p, --page <FILE>        Page snapshot JSON to track (re-read on change)
    -e, --expression <EXPR>  Space-separated subtitle class names
        --interval <MS>      Auto-read interval in milliseconds
        --video-volume <V>   Set the page video's volume (0-1)
        --once               Parse and speak the current subtitle, then exit

ENVIRONMENT:
    RUST_LOG                 Overrides the configured log level
"#
    );
}

fn speech_engine(store: &dyn ConfigStore) -> Box<dyn SpeechEngine> {
    match store.load().speech.command {
        Some(command) => {
            info!("Using speech program: {}", command.program);
            Box::new(CommandSpeechEngine::new(command))
        }
        None => {
            info!("No speech program configured, logging utterances instead");
            Box::new(LogSpeechEngine::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = parse_args();

    let store = match &cli.config_path {
        Some(path) => FileConfigStore::new(path.clone()),
        None => FileConfigStore::default_location(),
    };
    let config = store.load();

    // Initialize logging
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone());
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    info!("Starting Subtitle Reader");
    info!("Configuration loaded from {:?}", store.path());

    let Some(page_path) = cli.page_path.clone() else {
        eprintln!("Missing --page <FILE>. Use --help for usage information.");
        std::process::exit(1);
    };
    let page = SnapshotFilePage::load(page_path)?;

    let speech = speech_engine(&store);
    let mut engine = TrackingEngine::with_store(Box::new(store), page, speech);

    if let Some(expression) = &cli.expression {
        engine.update_config(|config| {
            config.tracking.expression = expression.clone();
            config.tracking.enabled = true;
        });
    }
    if let Some(interval_ms) = cli.interval_ms {
        engine.update_config(|config| config.auto_read.interval_ms = interval_ms);
    }

    if let Some(volume) = cli.video_volume {
        let applied = engine.set_video_volume(volume);
        info!("🎬 Video volume set to {:.2}", applied);
    }

    if cli.once {
        let snapshot = engine.parse_and_speak();
        match &snapshot.error {
            Some(e) => println!("❌ {}", e),
            None => println!(
                "📥 {} ({} element(s))",
                snapshot.text, snapshot.matched_element_count
            ),
        }
        // Give an external speech program time to finish
        while engine.dispatcher_mut().is_speaking() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        return Ok(());
    }

    let initial = engine.snapshot();
    match &initial.error {
        Some(e) => info!("🔍 Current subtitle: none ({})", e),
        None => info!("🔍 Current subtitle: {:?}", initial.text),
    }

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ReaderEvent::TextChanged(text) => info!("📥 {}", text),
                ReaderEvent::Spoken(_) => {}
                ReaderEvent::Alert(message) => warn!("⚠️  {}", message),
                ReaderEvent::AutoReadChanged(enabled) => {
                    info!("Auto-read {}", if enabled { "enabled" } else { "disabled" })
                }
            }
        }
    });

    let auto_read = engine.config().auto_read.enabled;
    let mut scheduler = AutoReadScheduler::new(engine);
    if auto_read {
        if let Err(e) = scheduler.start().await {
            error!("{}", e);
        }
    } else {
        info!("Auto-read is disabled in configuration, idling");
    }

    // Setup shutdown signal
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\n🛑 Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    scheduler.dispose().await;
    info!("Subtitle Reader stopped");
    Ok(())
}

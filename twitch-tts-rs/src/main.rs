//! twitch-tts-rs: reads a Twitch channel's chat aloud, ducking other audio.

mod chat;
mod config;
mod error;
mod playback;
mod service;
mod speech;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use playback::mixer::{AudioMixer, PactlMixer};
use playback::player::RodioPlayer;
use speech::engine::{create_engine, FfmpegConcat};

#[derive(Parser, Debug)]
#[command(name = "twitch-tts-rs", about = "Twitch chat text-to-speech with volume ducking")]
struct Args {
    /// Path to config.txt
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel to read (overrides CHANNEL_NAME)
    #[arg(long)]
    channel: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose; symphonia is noisy at debug.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug,symphonia=info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("twitch-tts-rs starting");

    let config = match config::Config::load(args.config.as_deref(), args.channel.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("twitch-tts-rs: {e}");
            eprintln!("Create a config.txt with at least CHANNEL_NAME=<channel>, or pass --config.");
            std::process::exit(1);
        }
    };

    let engine = create_engine(config.engine);
    info!("TTS engine: {}", engine.name());

    let mixer = PactlMixer::detect()
        .await
        .map(|m| Arc::new(m) as Arc<dyn AudioMixer>);

    let capabilities = service::Capabilities {
        engine: Arc::from(engine),
        concat: Arc::new(FfmpegConcat::default()),
        player: Arc::new(RodioPlayer),
        mixer,
    };

    service::TtsService::new(config, capabilities).run().await?;

    Ok(())
}

//! Pipeline orchestration.
//!
//! ChatReader → text queue → SynthesisWorker → audio queue → PlaybackWorker
//!
//! All three run as tasks until Ctrl-C or SIGTERM, then stop together.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chat::reader::ChatReader;
use crate::chat::ChatEvent;
use crate::config::Config;
use crate::error::Result;
use crate::playback::ducker::VolumeDucker;
use crate::playback::mixer::AudioMixer;
use crate::playback::player::AudioPlayer;
use crate::playback::worker::PlaybackWorker;
use crate::speech::engine::{AudioConcat, SpeechEngine};
use crate::speech::pronunciation::PronunciationTable;
use crate::speech::segmenter::Segmenter;
use crate::speech::synthesizer::{AudioArtifact, Synthesizer, VoiceSet};
use crate::speech::worker::{SenderCooldown, SynthesisWorker};

/// External capabilities resolved once at startup.
pub struct Capabilities {
    pub engine: Arc<dyn SpeechEngine>,
    pub concat: Arc<dyn AudioConcat>,
    pub player: Arc<dyn AudioPlayer>,
    pub mixer: Option<Arc<dyn AudioMixer>>,
}

pub struct TtsService {
    config: Config,
    capabilities: Capabilities,
}

impl TtsService {
    pub fn new(config: Config, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities,
        }
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            capabilities,
        } = self;

        std::fs::create_dir_all(&config.scratch_dir)?;

        let (text_tx, text_rx) = mpsc::unbounded_channel::<ChatEvent>();
        let (audio_tx, audio_rx) = mpsc::unbounded_channel::<AudioArtifact>();
        let cancel = CancellationToken::new();

        let ducker = Arc::new(VolumeDucker::new(
            capabilities.mixer,
            config.attenuation,
            config.attenuation_delay,
            config.attenuation_exclude.clone(),
        ));

        let synthesizer = Synthesizer::new(
            capabilities.engine,
            capabilities.concat,
            VoiceSet {
                default: config.voice_english.clone(),
                alternate: config.voice_japanese.clone(),
            },
            config.scratch_dir.clone(),
        );
        let synthesis = SynthesisWorker::new(
            Segmenter::new(PronunciationTable::builtin()),
            synthesizer,
            SenderCooldown::new(config.name_repeat_cooldown),
        );
        let playback = PlaybackWorker::new(
            ducker.clone(),
            capabilities.player,
            config.tts_volume,
            config.burst_grace,
        );
        let reader = ChatReader::new(&config);

        let reader_handle = tokio::spawn(reader.run(text_tx, cancel.clone()));
        let synthesis_handle = tokio::spawn(synthesis.run(text_rx, audio_tx, cancel.clone()));
        let playback_handle = tokio::spawn(playback.run(audio_rx, cancel.clone()));

        info!(
            "Reading #{} (voices: {} / {}, ducking {})",
            config.channel_name,
            config.voice_english,
            config.voice_japanese,
            if ducker.is_available() { "on" } else { "off" }
        );

        wait_for_shutdown().await;
        info!("Shutting down");
        cancel.cancel();

        for (name, handle) in [
            ("chat reader", reader_handle),
            ("synthesis worker", synthesis_handle),
            ("playback worker", playback_handle),
        ] {
            if let Err(e) = handle.await {
                error!("{name} task failed: {e}");
            }
        }

        // Covers a playback worker that panicked or stopped mid-ramp.
        ducker.restore_immediately().await;
        info!("Stopped");
        Ok(())
    }
}

async fn wait_for_shutdown() {
    tokio::select! {
        _ = wait_for_interrupt(tokio::signal::ctrl_c()) => info!("Received SIGINT"),
        _ = wait_for_sigterm() => info!("Received SIGTERM"),
    }
}

/// Resolves once the interrupt fires. A listener that cannot be set up
/// never resolves, leaving SIGTERM as the way out.
async fn wait_for_interrupt<F>(listener: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = listener.await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to register SIGTERM handler: {e}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

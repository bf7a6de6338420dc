//! Audio output through rodio.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use tracing::debug;

use crate::error::{Result, TtsError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Plays one file to completion at a fixed volume.
///
/// Dropping the returned future stops playback.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, path: &Path, volume: f32) -> Result<()>;
}

/// Sets the flag when the awaiting future goes away.
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Default output device, opened per utterance.
///
/// The output stream lives on the blocking thread that plays the file, so a
/// device that disappears between messages is picked up again next time.
#[derive(Default)]
pub struct RodioPlayer;

fn playback_error(message: impl std::fmt::Display) -> TtsError {
    TtsError::Playback {
        message: message.to_string(),
    }
}

fn play_blocking(path: &Path, volume: f32, stop: &AtomicBool) -> Result<()> {
    let mut stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| playback_error(format!("failed to open audio output: {e}")))?;
    stream.log_on_drop(false);

    let file = File::open(path)?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| playback_error(format!("cannot decode {}: {e}", path.display())))?;

    let sink = Sink::connect_new(stream.mixer());
    sink.set_volume(volume);
    sink.append(source);

    while !sink.empty() {
        if stop.load(Ordering::Relaxed) {
            debug!("Playback stopped");
            sink.stop();
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

#[async_trait]
impl AudioPlayer for RodioPlayer {
    async fn play(&self, path: &Path, volume: f32) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(stop.clone());
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || play_blocking(&path, volume, &stop))
            .await
            .map_err(|e| playback_error(format!("playback task failed: {e}")))?
    }
}

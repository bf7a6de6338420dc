//! Audio queue → speakers, grouped into bursts.
//!
//! IDLE → DUCKING → PLAYING → CHAIN_CHECK → (PLAYING | RESTORING) → IDLE
//!
//! Other audio is ducked once when a burst starts and restored once when it
//! ends. A burst continues while artifacts are already queued or arrive
//! within the grace window after the previous one finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ducker::VolumeDucker;
use super::player::AudioPlayer;
use crate::speech::synthesizer::AudioArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Ducking,
    Playing,
    ChainCheck,
    Restoring,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Ducking => write!(f, "DUCKING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::ChainCheck => write!(f, "CHAIN_CHECK"),
            Self::Restoring => write!(f, "RESTORING"),
        }
    }
}

pub struct PlaybackWorker {
    ducker: Arc<VolumeDucker>,
    player: Arc<dyn AudioPlayer>,
    volume: f32,
    grace: Duration,
    state: PlaybackState,
}

impl PlaybackWorker {
    pub fn new(
        ducker: Arc<VolumeDucker>,
        player: Arc<dyn AudioPlayer>,
        volume: f32,
        grace: Duration,
    ) -> Self {
        Self {
            ducker,
            player,
            volume: volume.clamp(0.0, 1.0),
            grace,
            state: PlaybackState::Idle,
        }
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            debug!("Playback state: {} → {}", self.state, next);
            self.state = next;
        }
    }

    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<AudioArtifact>,
        cancel: CancellationToken,
    ) {
        loop {
            self.transition(PlaybackState::Idle);
            let first = tokio::select! {
                _ = cancel.cancelled() => break,
                artifact = rx.recv() => match artifact {
                    Some(artifact) => artifact,
                    None => break,
                },
            };

            self.burst(first, &mut rx, &cancel).await;
            if cancel.is_cancelled() {
                break;
            }
        }
        self.transition(PlaybackState::Idle);
        debug!("Playback worker stopped");
    }

    /// One duck, any number of artifacts, one restore.
    async fn burst(
        &mut self,
        first: AudioArtifact,
        rx: &mut mpsc::UnboundedReceiver<AudioArtifact>,
        cancel: &CancellationToken,
    ) {
        self.transition(PlaybackState::Ducking);
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.ducker.duck() => {}
        }

        let mut played = 0usize;
        let mut next = Some(first);
        while let Some(artifact) = next.take() {
            if cancel.is_cancelled() {
                // Dropping the artifact removes its file.
                break;
            }
            self.transition(PlaybackState::Playing);
            self.play(artifact, cancel).await;
            played += 1;

            if cancel.is_cancelled() {
                break;
            }
            self.transition(PlaybackState::ChainCheck);
            next = self.next_in_burst(rx, cancel).await;
        }

        self.transition(PlaybackState::Restoring);
        self.ducker.restore().await;
        info!("Burst finished after {played} message(s)");
    }

    /// Play and then delete the artifact, whatever the outcome.
    async fn play(&self, artifact: AudioArtifact, cancel: &CancellationToken) {
        debug!("Playing audio queued {:?} ago", artifact.created_at.elapsed());
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Playback interrupted by shutdown");
                Ok(())
            }
            result = self.player.play(artifact.path(), self.volume) => result,
        };
        if let Err(e) = result {
            error!("Playback failed: {e}");
        }

        let path = artifact.path().display().to_string();
        if let Err(e) = artifact.discard() {
            warn!("Failed to delete {path}: {e}");
        }
    }

    /// The next artifact if one is queued or arrives within the grace window.
    async fn next_in_burst(
        &self,
        rx: &mut mpsc::UnboundedReceiver<AudioArtifact>,
        cancel: &CancellationToken,
    ) -> Option<AudioArtifact> {
        match rx.try_recv() {
            Ok(artifact) => return Some(artifact),
            Err(TryRecvError::Disconnected) => return None,
            Err(TryRecvError::Empty) => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(self.grace, rx.recv()) => match result {
                Ok(artifact) => artifact,
                Err(_) => {
                    debug!("No message within {:?}, ending burst", self.grace);
                    None
                }
            },
        }
    }
}

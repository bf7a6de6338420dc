//! Text queue → audio queue.
//!
//! One chat event at a time, in arrival order. A failed synthesis drops that
//! event and the worker moves on to the next one.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::segmenter::Segmenter;
use super::synthesizer::{AudioArtifact, Synthesizer};
use crate::chat::ChatEvent;
use crate::error::Result;

/// Remembers only the most recent announced sender.
#[derive(Debug, Clone)]
pub struct SenderCooldown {
    window: Duration,
    last_sender: Option<String>,
    last_timestamp: Option<Instant>,
}

impl SenderCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sender: None,
            last_timestamp: None,
        }
    }

    /// Text to speak for an event.
    ///
    /// The same sender inside the window gets just the message; anyone else
    /// is announced by name and restarts the window.
    pub fn speech_text(&mut self, event: &ChatEvent) -> String {
        let within_window = self.last_sender.as_deref() == Some(event.sender.as_str())
            && self
                .last_timestamp
                .is_some_and(|t| event.received_at.saturating_duration_since(t) < self.window);

        if within_window {
            return event.text.clone();
        }

        self.last_sender = Some(event.sender.clone());
        self.last_timestamp = Some(event.received_at);
        format!("{} says {}", event.display_name, event.text)
    }
}

pub struct SynthesisWorker {
    segmenter: Segmenter,
    synthesizer: Synthesizer,
    cooldown: SenderCooldown,
}

impl SynthesisWorker {
    pub fn new(segmenter: Segmenter, synthesizer: Synthesizer, cooldown: SenderCooldown) -> Self {
        Self {
            segmenter,
            synthesizer,
            cooldown,
        }
    }

    async fn process(&mut self, event: &ChatEvent) -> Result<AudioArtifact> {
        let text = self.cooldown.speech_text(event);
        info!("TTS: {text}");

        let segments = self.segmenter.segment(&text);
        debug!("{} segment(s)", segments.len());
        self.synthesizer.synthesize(&segments).await
    }

    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ChatEvent>,
        tx: mpsc::UnboundedSender<AudioArtifact>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            // Dropping an in-flight synthesis on cancel removes its scratch files.
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.process(&event) => result,
            };

            match result {
                Ok(artifact) => {
                    if tx.send(artifact).is_err() {
                        break;
                    }
                }
                Err(e) => error!("Dropping message from {}: {e}", event.display_name),
            }
        }
        debug!("Synthesis worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::pronunciation::PronunciationTable;
    use super::super::synthesizer::fakes::{voices, FakeConcat, FakeEngine};
    use super::*;

    fn event(sender: &str, text: &str, at: Instant) -> ChatEvent {
        ChatEvent {
            sender: sender.to_lowercase(),
            display_name: sender.to_string(),
            text: text.to_string(),
            received_at: at,
        }
    }

    #[test]
    fn test_first_message_is_prefixed() {
        let mut cooldown = SenderCooldown::new(Duration::from_secs(10));
        let text = cooldown.speech_text(&event("Yuki", "こんにちは friend", Instant::now()));
        assert_eq!(text, "Yuki says こんにちは friend");
    }

    #[test]
    fn test_same_sender_within_window_drops_prefix() {
        let mut cooldown = SenderCooldown::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert_eq!(cooldown.speech_text(&event("Ann", "one", t0)), "Ann says one");
        assert_eq!(cooldown.speech_text(&event("Ann", "two", t0 + Duration::from_secs(3))), "two");
        // The window is measured from the last announcement, not the last message.
        assert_eq!(
            cooldown.speech_text(&event("Ann", "three", t0 + Duration::from_secs(11))),
            "Ann says three"
        );
    }

    #[test]
    fn test_other_sender_resets_the_clock() {
        let mut cooldown = SenderCooldown::new(Duration::from_secs(10));
        let t0 = Instant::now();

        cooldown.speech_text(&event("Ann", "one", t0));
        assert_eq!(
            cooldown.speech_text(&event("Bob", "hi", t0 + Duration::from_secs(1))),
            "Bob says hi"
        );
        assert_eq!(
            cooldown.speech_text(&event("Ann", "again", t0 + Duration::from_secs(2))),
            "Ann says again"
        );
        assert_eq!(
            cooldown.speech_text(&event("Ann", "more", t0 + Duration::from_secs(3))),
            "more"
        );
    }

    #[test]
    fn test_zero_window_always_prefixes() {
        let mut cooldown = SenderCooldown::new(Duration::ZERO);
        let t0 = Instant::now();
        cooldown.speech_text(&event("Ann", "one", t0));
        assert_eq!(cooldown.speech_text(&event("Ann", "two", t0)), "Ann says two");
    }

    fn worker(engine: FakeEngine, dir: &std::path::Path) -> SynthesisWorker {
        let synthesizer = Synthesizer::new(
            Arc::new(engine),
            Arc::new(FakeConcat::default()),
            voices(),
            dir.to_path_buf(),
        );
        SynthesisWorker::new(
            Segmenter::new(PronunciationTable::builtin()),
            synthesizer,
            SenderCooldown::new(Duration::from_secs(10)),
        )
    }

    #[tokio::test]
    async fn test_worker_produces_artifacts_in_order_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            fail_on: vec!["Bob says broken".into()],
            ..FakeEngine::default()
        };
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let t0 = Instant::now();
        text_tx.send(event("Yuki", "こんにちは friend", t0)).unwrap();
        text_tx.send(event("Bob", "broken", t0)).unwrap();
        text_tx.send(event("Bob", "works", t0)).unwrap();
        drop(text_tx);

        worker(engine, dir.path())
            .run(text_rx, audio_tx, cancel)
            .await;

        let first = audio_rx.recv().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(first.path()).unwrap(),
            "en:Yuki says|ja:こんにちは|en:friend|"
        );
        // "Bob says broken" failed but still started Bob's cooldown.
        let second = audio_rx.recv().await.unwrap();
        assert_eq!(std::fs::read_to_string(second.path()).unwrap(), "en:works|");
        assert!(audio_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (_text_tx, text_rx) = mpsc::unbounded_channel::<ChatEvent>();
        let (audio_tx, _audio_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        worker(FakeEngine::default(), dir.path())
            .run(text_rx, audio_tx, cancel)
            .await;
    }
}

//! Segments → one playable audio file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempPath;
use tokio::time::Instant;
use tracing::debug;

use super::engine::{AudioConcat, SpeechEngine};
use super::segmenter::{Segment, Voice};
use crate::error::{Result, TtsError};

/// A synthesized utterance on disk.
///
/// The file is removed exactly once: by `discard`, or when the artifact is
/// dropped without being discarded (e.g. a queue dropped on shutdown).
#[derive(Debug)]
pub struct AudioArtifact {
    path: TempPath,
    pub created_at: Instant,
}

impl AudioArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file, reporting failures.
    pub fn discard(self) -> std::io::Result<()> {
        self.path.close()
    }
}

/// Voice names for each script.
#[derive(Debug, Clone)]
pub struct VoiceSet {
    pub default: String,
    pub alternate: String,
}

impl VoiceSet {
    pub fn name(&self, voice: Voice) -> &str {
        match voice {
            Voice::Default => &self.default,
            Voice::Alternate => &self.alternate,
        }
    }
}

pub struct Synthesizer {
    engine: Arc<dyn SpeechEngine>,
    concat: Arc<dyn AudioConcat>,
    voices: VoiceSet,
    scratch_dir: PathBuf,
}

impl Synthesizer {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        concat: Arc<dyn AudioConcat>,
        voices: VoiceSet,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            concat,
            voices,
            scratch_dir,
        }
    }

    fn scratch_file(&self) -> Result<TempPath> {
        let suffix = format!(".{}", self.engine.extension());
        let file = tempfile::Builder::new()
            .prefix("tts-")
            .suffix(&suffix)
            .tempfile_in(&self.scratch_dir)?;
        Ok(file.into_temp_path())
    }

    /// Synthesize one segment into its own scratch file and check it has audio.
    async fn synthesize_segment(&self, segment: &Segment) -> Result<TempPath> {
        let voice = self.voices.name(segment.voice);
        let path = self.scratch_file()?;
        self.engine
            .synthesize(segment.text.trim(), voice, &path)
            .await?;

        let len = tokio::fs::metadata(&path).await?.len();
        if len == 0 {
            return Err(TtsError::EmptyAudio {
                voice: voice.to_string(),
            });
        }
        Ok(path)
    }

    /// Synthesize segments in order into a single artifact.
    ///
    /// Blank segments are skipped. Multi-segment output is stream-copied
    /// together; the per-segment files are removed whether or not that works.
    pub async fn synthesize(&self, segments: &[Segment]) -> Result<AudioArtifact> {
        let spoken: Vec<&Segment> = segments
            .iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();

        let path = match spoken.as_slice() {
            [] => return Err(TtsError::NothingToSay),
            [single] => self.synthesize_segment(single).await?,
            many => {
                let mut parts = Vec::with_capacity(many.len());
                for segment in many {
                    parts.push(self.synthesize_segment(segment).await?);
                }
                let output = self.scratch_file()?;
                let inputs: Vec<&Path> = parts.iter().map(|p| &**p).collect();
                self.concat.concat(&inputs, &output).await?;
                debug!("Concatenated {} segments", parts.len());
                output
            }
        };

        Ok(AudioArtifact {
            path,
            created_at: Instant::now(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Writes `"<voice>:<text>|"` as the audio bytes. Texts listed in
    /// `fail_on` fail; texts in `silent_on` produce an empty file.
    #[derive(Default)]
    pub struct FakeEngine {
        pub calls: Mutex<Vec<(String, String)>>,
        pub fail_on: Vec<String>,
        pub silent_on: Vec<String>,
    }

    #[async_trait]
    impl SpeechEngine for FakeEngine {
        async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), voice.to_string()));
            if self.fail_on.iter().any(|t| t == text) {
                return Err(TtsError::SynthesisFailed {
                    engine: "fake".into(),
                    voice: voice.into(),
                    message: "boom".into(),
                });
            }
            let bytes = if self.silent_on.iter().any(|t| t == text) {
                String::new()
            } else {
                format!("{voice}:{text}|")
            };
            tokio::fs::write(output, bytes).await?;
            Ok(())
        }

        fn extension(&self) -> &str {
            "mp3"
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Byte-level concatenation, like a stream copy of raw frames.
    #[derive(Default)]
    pub struct FakeConcat {
        pub fail: bool,
    }

    #[async_trait]
    impl AudioConcat for FakeConcat {
        async fn concat(&self, inputs: &[&Path], output: &Path) -> Result<()> {
            if self.fail {
                return Err(TtsError::Concat {
                    message: "boom".into(),
                });
            }
            let mut joined = Vec::new();
            for input in inputs {
                joined.extend(tokio::fs::read(input).await?);
            }
            tokio::fs::write(output, joined).await?;
            Ok(())
        }
    }

    /// An artifact backed by an empty file named exactly `name` in `dir`.
    pub fn artifact(dir: &Path, name: &str) -> AudioArtifact {
        let file = tempfile::Builder::new()
            .prefix(name)
            .rand_bytes(0)
            .tempfile_in(dir)
            .unwrap();
        AudioArtifact {
            path: file.into_temp_path(),
            created_at: Instant::now(),
        }
    }

    pub fn voices() -> VoiceSet {
        VoiceSet {
            default: "en".into(),
            alternate: "ja".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{voices, FakeConcat, FakeEngine};
    use super::*;

    fn synthesizer(engine: FakeEngine, concat: FakeConcat, dir: &Path) -> Synthesizer {
        Synthesizer::new(Arc::new(engine), Arc::new(concat), voices(), dir.to_path_buf())
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    fn seg(text: &str, voice: Voice) -> Segment {
        Segment {
            text: text.into(),
            voice,
        }
    }

    #[tokio::test]
    async fn test_single_segment() {
        let dir = tempfile::tempdir().unwrap();
        let synth = synthesizer(FakeEngine::default(), FakeConcat::default(), dir.path());

        let artifact = synth.synthesize(&[seg("hello", Voice::Default)]).await.unwrap();
        assert_eq!(std::fs::read_to_string(artifact.path()).unwrap(), "en:hello|");
        assert_eq!(files_in(dir.path()), 1);

        artifact.discard().unwrap();
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_multi_segment_concatenates_in_order_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let synth = synthesizer(FakeEngine::default(), FakeConcat::default(), dir.path());

        let artifact = synth
            .synthesize(&[
                seg("Yuki says ", Voice::Default),
                seg("こんにちは ", Voice::Alternate),
                seg("friend", Voice::Default),
            ])
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(artifact.path()).unwrap(),
            "en:Yuki says|ja:こんにちは|en:friend|"
        );
        // Only the final artifact is left behind.
        assert_eq!(files_in(dir.path()), 1);
        drop(artifact);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_audio_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            silent_on: vec!["hello".into()],
            ..FakeEngine::default()
        };
        let synth = synthesizer(engine, FakeConcat::default(), dir.path());

        let err = synth.synthesize(&[seg("hello", Voice::Default)]).await.unwrap_err();
        assert!(matches!(err, TtsError::EmptyAudio { ref voice } if voice == "en"));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_segment_failure_removes_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine {
            fail_on: vec!["friend".into()],
            ..FakeEngine::default()
        };
        let synth = synthesizer(engine, FakeConcat::default(), dir.path());

        let err = synth
            .synthesize(&[seg("こんにちは ", Voice::Alternate), seg("friend", Voice::Default)])
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::SynthesisFailed { .. }));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_concat_failure_removes_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let synth = synthesizer(FakeEngine::default(), FakeConcat { fail: true }, dir.path());

        let err = synth
            .synthesize(&[seg("a ", Voice::Default), seg("日本", Voice::Alternate)])
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Concat { .. }));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_blank_segments_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let synth = synthesizer(FakeEngine::default(), FakeConcat::default(), dir.path());

        let err = synth.synthesize(&[seg("   ", Voice::Default)]).await.unwrap_err();
        assert!(matches!(err, TtsError::NothingToSay));
    }
}

//! External speech capabilities: synthesis engines and lossless concat.
//!
//! Both are child processes driven through `tokio::process`. Children are
//! killed if the awaiting future is dropped, so a cancelled synthesis never
//! keeps writing into the scratch directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::EngineKind;
use crate::error::{Result, TtsError};

/// Text-to-speech capability: write `text` spoken by `voice` to `output`.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()>;

    /// File extension of the produced audio, without the dot.
    fn extension(&self) -> &str;

    fn name(&self) -> &str;
}

/// Joins audio files of identical encoding without re-encoding.
#[async_trait]
pub trait AudioConcat: Send + Sync {
    async fn concat(&self, inputs: &[&Path], output: &Path) -> Result<()>;
}

pub fn create_engine(kind: EngineKind) -> Box<dyn SpeechEngine> {
    match kind {
        EngineKind::Edge => Box::new(EdgeTtsEngine::default()),
        EngineKind::Espeak => Box::new(EspeakEngine::default()),
    }
}

/// Run a child to completion; stderr becomes the error message on failure.
async fn run(mut command: Command, program: &str) -> std::result::Result<(), String> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = command
        .output()
        .await
        .map_err(|e| format!("failed to launch {program}: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last = stderr.lines().last().unwrap_or_default().trim();
        Err(format!("{program} exited with {}: {last}", output.status))
    }
}

/// Microsoft Edge neural voices via the `edge-tts` command line tool.
pub struct EdgeTtsEngine {
    program: PathBuf,
}

impl Default for EdgeTtsEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("edge-tts"),
        }
    }
}

/// Options are passed as `--opt=value` so chat text starting with `-` is
/// never taken for an option.
fn edge_args(text: &str, voice: &str, output: &Path) -> Vec<OsString> {
    let mut media = OsString::from("--write-media=");
    media.push(output);
    vec![
        format!("--voice={voice}").into(),
        format!("--text={text}").into(),
        media,
    ]
}

#[async_trait]
impl SpeechEngine for EdgeTtsEngine {
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.args(edge_args(text, voice, output));

        debug!("edge-tts [{voice}]: {text}");
        run(command, "edge-tts")
            .await
            .map_err(|message| TtsError::SynthesisFailed {
                engine: self.name().into(),
                voice: voice.into(),
                message,
            })
    }

    fn extension(&self) -> &str {
        "mp3"
    }

    fn name(&self) -> &str {
        "edge-tts"
    }
}

/// Offline synthesis through `espeak-ng`.
pub struct EspeakEngine {
    program: PathBuf,
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("espeak-ng"),
        }
    }
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command.arg("-v").arg(voice).arg("-w").arg(output).arg("--").arg(text);

        debug!("espeak-ng [{voice}]: {text}");
        run(command, "espeak-ng")
            .await
            .map_err(|message| TtsError::SynthesisFailed {
                engine: self.name().into(),
                voice: voice.into(),
                message,
            })
    }

    fn extension(&self) -> &str {
        "wav"
    }

    fn name(&self) -> &str {
        "espeak-ng"
    }
}

/// ffmpeg's concat demuxer with `-c copy`.
pub struct FfmpegConcat {
    program: PathBuf,
}

impl Default for FfmpegConcat {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

/// Lines for the concat demuxer's list file.
fn concat_list(inputs: &[&Path]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.display().to_string().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

#[async_trait]
impl AudioConcat for FfmpegConcat {
    async fn concat(&self, inputs: &[&Path], output: &Path) -> Result<()> {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let list = tempfile::Builder::new()
            .prefix("tts-concat-")
            .suffix(".txt")
            .tempfile_in(dir)?
            .into_temp_path();
        tokio::fs::write(&list, concat_list(inputs)).await?;

        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&*list)
            .args(["-c", "copy"])
            .arg(output);

        run(command, "ffmpeg")
            .await
            .map_err(|message| TtsError::Concat { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_quotes_paths() {
        let a = PathBuf::from("/tmp/a.mp3");
        let b = PathBuf::from("/tmp/it's.mp3");
        let list = concat_list(&[a.as_path(), b.as_path()]);
        assert_eq!(list, "file '/tmp/a.mp3'\nfile '/tmp/it'\\''s.mp3'\n");
    }

    #[test]
    fn test_edge_args_keep_dashed_text_attached() {
        let args = edge_args("-_-", "en-GB-RyanNeural", Path::new("/tmp/out.mp3"));
        assert_eq!(
            args,
            vec![
                OsString::from("--voice=en-GB-RyanNeural"),
                OsString::from("--text=-_-"),
                OsString::from("--write-media=/tmp/out.mp3"),
            ]
        );

        let args = edge_args("--help me", "v", Path::new("o.mp3"));
        assert_eq!(args[1], OsString::from("--text=--help me"));
    }

    #[test]
    fn test_engine_selection() {
        assert_eq!(create_engine(EngineKind::Edge).name(), "edge-tts");
        assert_eq!(create_engine(EngineKind::Edge).extension(), "mp3");
        assert_eq!(create_engine(EngineKind::Espeak).name(), "espeak-ng");
        assert_eq!(create_engine(EngineKind::Espeak).extension(), "wav");
    }

    #[tokio::test]
    async fn test_missing_program_is_a_synthesis_error() {
        let engine = EdgeTtsEngine {
            program: PathBuf::from("/nonexistent/edge-tts"),
        };
        let dir = tempfile::tempdir().unwrap();
        let err = engine
            .synthesize("hi", "en-GB-RyanNeural", &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::SynthesisFailed { .. }));
        assert!(err.to_string().contains("failed to launch edge-tts"));
    }
}

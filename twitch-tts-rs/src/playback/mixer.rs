//! Per-application volume control.
//!
//! The capability is optional: `PactlMixer::detect` returns `None` on hosts
//! without a PulseAudio-compatible server, and ducking becomes a no-op.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, TtsError};

/// PulseAudio's 100% volume.
const PA_VOLUME_NORM: f32 = 65536.0;

/// One application's audio stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSession {
    pub id: u32,
    pub process_id: Option<u32>,
    pub process_name: Option<String>,
    pub app_name: Option<String>,
    /// Linear volume per channel in channel-map order, 1.0 = 100%.
    pub volumes: Vec<f32>,
}

#[async_trait]
pub trait AudioMixer: Send + Sync {
    async fn sessions(&self) -> Result<Vec<AudioSession>>;

    /// One volume per channel. Fails with `SessionGone` if the stream no
    /// longer exists.
    async fn set_volume(&self, id: u32, volumes: &[f32]) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct PactlChannelVolume {
    value: u32,
}

#[derive(Debug, Deserialize)]
struct PactlSinkInput {
    index: u32,
    #[serde(default)]
    channel_map: String,
    #[serde(default)]
    volume: HashMap<String, PactlChannelVolume>,
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
}

impl PactlSinkInput {
    fn property(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Raw channel values ordered by `channel_map`, falling back to name
    /// order when the map does not cover every channel.
    fn channel_values(&self) -> Vec<u32> {
        let mapped: Option<Vec<u32>> = self
            .channel_map
            .split(',')
            .filter(|c| !c.is_empty())
            .map(|c| self.volume.get(c.trim()).map(|v| v.value))
            .collect();
        match mapped {
            Some(values) if values.len() == self.volume.len() => values,
            _ => {
                let mut named: Vec<(&String, u32)> =
                    self.volume.iter().map(|(k, v)| (k, v.value)).collect();
                named.sort();
                named.into_iter().map(|(_, v)| v).collect()
            }
        }
    }

    fn into_session(self) -> AudioSession {
        let volumes = self
            .channel_values()
            .into_iter()
            .map(|v| v as f32 / PA_VOLUME_NORM)
            .collect();
        AudioSession {
            id: self.index,
            process_id: self
                .property("application.process.id")
                .and_then(|p| p.parse().ok()),
            process_name: self.property("application.process.binary"),
            app_name: self.property("application.name"),
            volumes,
        }
    }
}

fn parse_sink_inputs(json: &str) -> Result<Vec<AudioSession>> {
    let inputs: Vec<PactlSinkInput> = serde_json::from_str(json).map_err(|e| TtsError::Mixer {
        message: format!("unexpected pactl output: {e}"),
    })?;
    Ok(inputs.into_iter().map(PactlSinkInput::into_session).collect())
}

/// `set-sink-input-volume` with raw per-channel values, so a restore writes
/// back exactly what was read.
fn volume_args(id: u32, volumes: &[f32]) -> Vec<String> {
    let mut args = vec!["set-sink-input-volume".to_string(), id.to_string()];
    args.extend(
        volumes
            .iter()
            .map(|v| ((v.max(0.0) * PA_VOLUME_NORM).round() as u32).to_string()),
    );
    args
}

/// PulseAudio / PipeWire sink inputs through the `pactl` CLI.
pub struct PactlMixer {
    program: String,
}

impl PactlMixer {
    /// Probe once at startup for a reachable sound server.
    pub async fn detect() -> Option<Self> {
        let mixer = Self {
            program: "pactl".into(),
        };
        let status = Command::new(&mixer.program)
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(s) if s.success() => {
                info!("Audio mixer: pactl");
                Some(mixer)
            }
            Ok(s) => {
                info!("pactl info exited with {s}, ducking disabled");
                None
            }
            Err(e) => {
                info!("pactl not available ({e}), ducking disabled");
                None
            }
        }
    }

    async fn pactl(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TtsError::Mixer {
                message: format!("failed to launch pactl: {e}"),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(TtsError::Mixer {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl AudioMixer for PactlMixer {
    async fn sessions(&self) -> Result<Vec<AudioSession>> {
        let json = self.pactl(&["-f", "json", "list", "sink-inputs"]).await?;
        parse_sink_inputs(&json)
    }

    async fn set_volume(&self, id: u32, volumes: &[f32]) -> Result<()> {
        if volumes.is_empty() {
            return Ok(());
        }
        let args = volume_args(id, volumes);
        debug!("pactl {}", args.join(" "));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match self.pactl(&args).await {
            Err(TtsError::Mixer { message }) if message.contains("No such entity") => {
                Err(TtsError::SessionGone { id })
            }
            other => other.map(|_| ()),
        }
    }
}

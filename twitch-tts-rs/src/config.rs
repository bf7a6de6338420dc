//! Configuration management for twitch-tts-rs.
//!
//! Loads `KEY=value` lines (with `#` comments) from a config file in one of
//! the standard locations. Only a missing file or a missing channel name is
//! fatal; bad numbers fall back to their defaults with a warning.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, TtsError};

pub const DEFAULT_CHAT_SERVER: &str = "irc.chat.twitch.tv:6667";

/// Which external speech engine synthesizes segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Edge,
    Espeak,
}

impl EngineKind {
    fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edge" | "edge-tts" => Some(Self::Edge),
            "espeak" | "espeak-ng" => Some(Self::Espeak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub channel_name: String,
    pub chat_server: String,
    pub engine: EngineKind,
    pub voice_english: String,
    pub voice_japanese: String,
    pub tts_volume: f32,
    pub attenuation: f32,
    pub attenuation_delay: Duration,
    pub attenuation_exclude: Vec<String>,
    pub burst_grace: Duration,
    pub ignore_users: HashSet<String>,
    pub name_repeat_cooldown: Duration,
    pub scratch_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_name: String::new(),
            chat_server: DEFAULT_CHAT_SERVER.into(),
            engine: EngineKind::Edge,
            voice_english: "en-GB-RyanNeural".into(),
            voice_japanese: "ja-JP-NanamiNeural".into(),
            tts_volume: 1.0,
            attenuation: 0.3,
            attenuation_delay: Duration::from_millis(300),
            attenuation_exclude: Vec::new(),
            burst_grace: Duration::from_millis(750),
            ignore_users: HashSet::new(),
            name_repeat_cooldown: Duration::from_secs(20),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a key=value file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.txt
    /// 2. ~/.config/twitch-tts/config.txt
    ///
    /// `channel` replaces the file's `CHANNEL_NAME` when given.
    pub fn load(path: Option<&Path>, channel: Option<&str>) -> Result<Self> {
        let candidates: Vec<PathBuf> = match path {
            Some(p) => vec![p.to_path_buf()],
            None => [
                std::env::current_dir().ok().map(|d| d.join("config.txt")),
                dirs::home_dir().map(|h| h.join(".config/twitch-tts/config.txt")),
            ]
            .into_iter()
            .flatten()
            .collect(),
        };

        let Some(config_path) = candidates.iter().find(|p| p.is_file()) else {
            let searched = candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(TtsError::ConfigFileNotFound { searched });
        };

        let contents = std::fs::read_to_string(config_path)?;
        let mut values = read_values(&contents);
        if let Some(channel) = channel {
            values.insert("CHANNEL_NAME".into(), channel.to_string());
        }
        let config = Self::from_values(&values)?;
        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    fn from_values(values: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| values.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let channel_name = get("CHANNEL_NAME")
            .map(normalize_channel)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| TtsError::ConfigMissingKey {
                key: "CHANNEL_NAME".into(),
            })?;

        let engine = match get("TTS_ENGINE") {
            Some(raw) => EngineKind::from_str(raw).unwrap_or_else(|| {
                warn!("Unknown TTS_ENGINE '{raw}', using edge");
                defaults.engine
            }),
            None => defaults.engine,
        };

        let voice_english = get("TTS_VOICE_ENGLISH")
            .or_else(|| get("TTS_VOICE"))
            .map(String::from)
            .unwrap_or(defaults.voice_english);
        let voice_japanese = get("TTS_VOICE_JAPANESE")
            .map(String::from)
            .unwrap_or(defaults.voice_japanese);

        Ok(Self {
            channel_name,
            chat_server: get("CHAT_SERVER")
                .map(String::from)
                .unwrap_or(defaults.chat_server),
            engine,
            voice_english,
            voice_japanese,
            tts_volume: unit_float(get("TTS_VOLUME"), "TTS_VOLUME", defaults.tts_volume),
            attenuation: unit_float(
                get("TTS_ATTENUATION"),
                "TTS_ATTENUATION",
                defaults.attenuation,
            ),
            attenuation_delay: millis(
                get("ATTENUATION_DELAY_MS"),
                "ATTENUATION_DELAY_MS",
                defaults.attenuation_delay,
            ),
            attenuation_exclude: comma_list(get("ATTENUATION_EXCLUDE_PROCESSES")),
            burst_grace: millis(get("BURST_GRACE_MS"), "BURST_GRACE_MS", defaults.burst_grace),
            ignore_users: comma_list(get("IGNORE_USERS")).into_iter().collect(),
            name_repeat_cooldown: seconds(
                get("NAME_REPEAT_COOLDOWN"),
                "NAME_REPEAT_COOLDOWN",
                defaults.name_repeat_cooldown,
            ),
            scratch_dir: get("TTS_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
        })
    }
}

/// `KEY=value` per line. Lines starting with `#` are comments; values are
/// taken literally apart from one pair of matching surrounding quotes.
fn read_values(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!("Skipping config line {}: expected KEY=value", number + 1);
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            warn!("Skipping config line {}: empty key", number + 1);
            continue;
        }
        values.insert(key.to_ascii_uppercase(), unquote(value.trim()).to_string());
    }
    values
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub fn normalize_channel(raw: &str) -> String {
    raw.trim().trim_start_matches('#').to_lowercase()
}

fn unit_float(raw: Option<&str>, key: &str, default: f32) -> f32 {
    let Some(raw) = raw else { return default };
    match raw.parse::<f32>() {
        Ok(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => {
            warn!("Invalid {key} '{raw}', using {default}");
            default
        }
    }
}

fn millis(raw: Option<&str>, key: &str, default: Duration) -> Duration {
    let Some(raw) = raw else { return default };
    match raw.parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => {
            warn!("Invalid {key} '{raw}', using {}ms", default.as_millis());
            default
        }
    }
}

fn seconds(raw: Option<&str>, key: &str, default: Duration) -> Duration {
    let Some(raw) = raw else { return default };
    match raw.parse::<f64>() {
        Ok(s) if s.is_finite() && s >= 0.0 => Duration::from_secs_f64(s),
        _ => {
            warn!("Invalid {key} '{raw}', using {}s", default.as_secs_f64());
            default
        }
    }
}

/// Lowercased, trimmed, non-empty entries of a comma-separated value.
fn comma_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

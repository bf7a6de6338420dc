//! Error types for twitch-tts-rs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtsError {
    // Configuration errors
    #[error("Configuration file not found (looked in {searched})")]
    ConfigFileNotFound { searched: String },

    #[error("Missing required configuration value {key}")]
    ConfigMissingKey { key: String },

    // Chat transport errors
    #[error("Chat connection failed: {message}")]
    ChatConnection { message: String },

    #[error("Chat server closed the connection")]
    ChatClosed,

    #[error("Malformed chat line: {reason}")]
    MalformedLine { reason: String },

    // Synthesis errors
    #[error("Speech engine {engine} failed for voice {voice}: {message}")]
    SynthesisFailed {
        engine: String,
        voice: String,
        message: String,
    },

    #[error("Speech engine produced no audio for voice {voice}")]
    EmptyAudio { voice: String },

    #[error("Audio concatenation failed: {message}")]
    Concat { message: String },

    #[error("Nothing to synthesize")]
    NothingToSay,

    // Playback errors
    #[error("Audio playback failed: {message}")]
    Playback { message: String },

    // Mixer errors
    #[error("Audio mixer call failed: {message}")]
    Mixer { message: String },

    #[error("Audio session {id} no longer exists")]
    SessionGone { id: u32 },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TtsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_missing_key_display() {
        let error = TtsError::ConfigMissingKey {
            key: "CHANNEL_NAME".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Missing required configuration value CHANNEL_NAME"
        );
    }

    #[test]
    fn test_synthesis_failed_display() {
        let error = TtsError::SynthesisFailed {
            engine: "edge-tts".to_string(),
            voice: "en-GB-RyanNeural".to_string(),
            message: "exit status 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Speech engine edge-tts failed for voice en-GB-RyanNeural: exit status 1"
        );
    }

    #[test]
    fn test_session_gone_display() {
        let error = TtsError::SessionGone { id: 42 };
        assert_eq!(error.to_string(), "Audio session 42 no longer exists");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: TtsError = io_error.into();
        assert!(matches!(error, TtsError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TtsError>();
    }
}

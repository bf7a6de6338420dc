//! Chat side of the pipeline: anonymous Twitch IRC reader.
//!
//! - `protocol`: line parsing, tag unescaping, emote stripping
//! - `reader`: connection state machine, filtering, reconnects

pub mod protocol;
pub mod reader;

use tokio::time::Instant;

/// One accepted public chat message, ready for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Login name (lowercase), used for cooldown tracking.
    pub sender: String,
    /// Name to speak.
    pub display_name: String,
    /// Message with emotes removed.
    pub text: String,
    pub received_at: Instant,
}

//! Anonymous read-only Twitch chat reader.
//!
//! DISCONNECTED → CONNECTING → JOINED → READING → (error) DISCONNECTED
//!
//! Loops until cancelled, waiting a fixed delay between connection attempts.

use std::collections::HashSet;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{parse_line, strip_emotes, ChatMessage, ServerLine};
use super::ChatEvent;
use crate::config::Config;
use crate::error::{Result, TtsError};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const COMMAND_PREFIX: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Disconnected,
    Connecting,
    Joined,
    Reading,
}

impl std::fmt::Display for ReaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Joined => write!(f, "JOINED"),
            Self::Reading => write!(f, "READING"),
        }
    }
}

pub struct ChatReader {
    channel: String,
    server: String,
    ignore_users: HashSet<String>,
    state: ReaderState,
}

impl ChatReader {
    pub fn new(config: &Config) -> Self {
        Self {
            channel: config.channel_name.to_lowercase(),
            server: config.chat_server.clone(),
            ignore_users: config.ignore_users.iter().map(|u| u.to_lowercase()).collect(),
            state: ReaderState::Disconnected,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    fn transition(&mut self, next: ReaderState) {
        if self.state != next {
            info!("Chat state: {} → {}", self.state, next);
            self.state = next;
        }
    }

    /// Read chat forever, reconnecting after any failure.
    pub async fn run(mut self, tx: mpsc::UnboundedSender<ChatEvent>, cancel: CancellationToken) {
        loop {
            self.transition(ReaderState::Connecting);

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connect_and_read(&tx) => result,
            };

            self.transition(ReaderState::Disconnected);
            match result {
                Ok(()) => break,
                Err(e) => warn!("Chat connection lost: {e}"),
            }

            info!("Reconnecting in {}s", RECONNECT_DELAY.as_secs());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }

        self.transition(ReaderState::Disconnected);
        debug!("Chat reader stopped");
    }

    async fn connect_and_read(&mut self, tx: &mpsc::UnboundedSender<ChatEvent>) -> Result<()> {
        let stream = TcpStream::connect(&self.server)
            .await
            .map_err(|e| TtsError::ChatConnection {
                message: format!("{}: {e}", self.server),
            })?;
        info!("Connected to {}", self.server);
        self.session(stream, tx).await
    }

    /// Join the channel on an open stream and forward accepted messages.
    ///
    /// Returns `Ok(())` only when the event queue is gone; a closed or
    /// failing stream is an error so the caller reconnects.
    pub async fn session<S>(&mut self, stream: S, tx: &mpsc::UnboundedSender<ChatEvent>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read, mut write) = tokio::io::split(stream);

        let nick = anonymous_nick();
        let handshake = format!(
            "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership\r\n\
             NICK {nick}\r\n\
             JOIN #{}\r\n",
            self.channel
        );
        write.write_all(handshake.as_bytes()).await?;
        write.flush().await?;
        self.transition(ReaderState::Joined);
        debug!("Joined #{} as {nick}", self.channel);

        let mut reader = BufReader::new(read);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Err(TtsError::ChatClosed);
            }
            self.transition(ReaderState::Reading);

            let line = String::from_utf8_lossy(&buf);
            match parse_line(&line) {
                Ok(ServerLine::Ping { reply }) => {
                    write.write_all(format!("{reply}\r\n").as_bytes()).await?;
                    write.flush().await?;
                    debug!("Answered keep-alive");
                }
                Ok(ServerLine::Message(message)) => {
                    let Some(event) = self.accept(message) else {
                        continue;
                    };
                    info!("Received: {}: {}", event.display_name, event.text);
                    if tx.send(event).is_err() {
                        return Ok(());
                    }
                }
                Ok(ServerLine::Other { command }) if command == "RECONNECT" => {
                    return Err(TtsError::ChatConnection {
                        message: "server requested reconnect".into(),
                    });
                }
                Ok(ServerLine::Other { command }) => debug!("Ignoring {command}"),
                Err(e) => warn!("{e}: {}", line.trim_end()),
            }
        }
    }

    /// Apply the filters and normalize a message into a `ChatEvent`.
    pub fn accept(&self, message: ChatMessage) -> Option<ChatEvent> {
        if !message.channel.eq_ignore_ascii_case(&self.channel) {
            return None;
        }
        let sender = message.sender.to_lowercase();
        if sender == self.channel {
            return None;
        }

        let display_name = message.display_name().unwrap_or_else(|| message.sender.clone());
        if self.ignore_users.contains(&sender)
            || self.ignore_users.contains(&display_name.to_lowercase())
        {
            debug!("Ignoring message from {display_name}");
            return None;
        }

        let text = strip_emotes(&message.text, message.emotes());
        if text.is_empty() || text.starts_with(COMMAND_PREFIX) {
            return None;
        }

        Some(ChatEvent {
            sender,
            display_name,
            text,
            received_at: Instant::now(),
        })
    }
}

/// Twitch accepts any `justinfan<digits>` nick without a token.
fn anonymous_nick() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 90_000 + 10_000;
    format!("justinfan{n}")
}

//! Twitch IRC line parsing.
//!
//! Lines look like
//! `@display-name=Yuki;emotes=25:0-4 :yuki!yuki@yuki.tmi.twitch.tv PRIVMSG #chan :Kappa hi`.
//! Only what the reader needs is parsed: PING, PRIVMSG, and the tags on them.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, TtsError};

/// A parsed inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Keep-alive; `reply` is the PONG to send back.
    Ping { reply: String },
    Message(ChatMessage),
    Other { command: String },
}

/// A public channel message (PRIVMSG).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub tags: HashMap<String, String>,
    pub sender: String,
    pub channel: String,
    pub text: String,
}

impl ChatMessage {
    /// `display-name` tag, unescaped, or `None` when absent or blank.
    pub fn display_name(&self) -> Option<String> {
        self.tags
            .get("display-name")
            .map(|v| unescape_tag_value(v))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn emotes(&self) -> Option<&str> {
        self.tags.get("emotes").map(String::as_str).filter(|v| !v.is_empty())
    }
}

fn malformed(reason: impl Into<String>) -> TtsError {
    TtsError::MalformedLine {
        reason: reason.into(),
    }
}

pub fn parse_line(line: &str) -> Result<ServerLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(malformed("empty line"));
    }

    let (tags, rest) = match line.strip_prefix('@') {
        Some(tagged) => {
            let (tags, rest) = tagged
                .split_once(' ')
                .ok_or_else(|| malformed("tags without command"))?;
            (parse_tags(tags), rest.trim_start())
        }
        None => (HashMap::new(), line),
    };

    let (prefix, rest) = match rest.strip_prefix(':') {
        Some(prefixed) => {
            let (prefix, rest) = prefixed
                .split_once(' ')
                .ok_or_else(|| malformed("prefix without command"))?;
            (Some(prefix), rest.trim_start())
        }
        None => (None, rest),
    };

    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));
    if command.is_empty() {
        return Err(malformed("missing command"));
    }

    match command {
        "PING" => Ok(ServerLine::Ping {
            reply: format!("PONG{}", &rest[command.len()..]),
        }),
        "PRIVMSG" => {
            let prefix = prefix.ok_or_else(|| malformed("PRIVMSG without prefix"))?;
            let sender = prefix.split('!').next().unwrap_or_default();
            if sender.is_empty() {
                return Err(malformed("PRIVMSG without sender nick"));
            }
            let (channel, text) = params
                .split_once(" :")
                .ok_or_else(|| malformed("PRIVMSG without trailing text"))?;
            Ok(ServerLine::Message(ChatMessage {
                tags,
                sender: sender.to_string(),
                channel: channel.trim().trim_start_matches('#').to_string(),
                text: strip_action(text).to_string(),
            }))
        }
        other => Ok(ServerLine::Other {
            command: other.to_string(),
        }),
    }
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// `/me` messages arrive wrapped as `\x01ACTION text\x01`.
fn strip_action(text: &str) -> &str {
    text.strip_prefix("\u{1}ACTION ")
        .map(|t| t.trim_end_matches('\u{1}'))
        .unwrap_or(text)
}

/// Undo IRCv3 tag value escaping.
pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Parse `id:start-end,start-end/id:start-end` into inclusive ranges.
fn parse_emote_ranges(emotes: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    for emote in emotes.split('/').filter(|e| !e.is_empty()) {
        let Some((_id, positions)) = emote.split_once(':') else {
            debug!("Skipping emote entry without positions: {emote}");
            continue;
        };
        for span in positions.split(',') {
            let parsed = span
                .split_once('-')
                .and_then(|(s, e)| Some((s.parse::<usize>().ok()?, e.parse::<usize>().ok()?)));
            match parsed {
                Some((start, end)) if start <= end => ranges.push((start, end)),
                _ => debug!("Skipping bad emote range: {span}"),
            }
        }
    }
    ranges
}

/// Merge overlapping or adjacent inclusive ranges, clamped to `len`.
fn merge_ranges(mut ranges: Vec<(usize, usize)>, len: usize) -> Vec<(usize, usize)> {
    ranges.retain(|&(start, _)| start < len);
    ranges.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        let end = end.min(len - 1);
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Remove emote ranges (UTF-16 code unit indices) from a message and
/// collapse the leftover whitespace.
///
/// Overlapping ranges are merged first, then removed highest start first so
/// no removal shifts an index that is still to be processed.
pub fn strip_emotes(text: &str, emotes: Option<&str>) -> String {
    let mut units: Vec<u16> = text.encode_utf16().collect();

    if let Some(emotes) = emotes {
        let ranges = merge_ranges(parse_emote_ranges(emotes), units.len());
        for (start, end) in ranges.into_iter().rev() {
            units.drain(start..=end);
        }
    }

    String::from_utf16_lossy(&units)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(line: &str) -> ChatMessage {
        match parse_line(line).unwrap() {
            ServerLine::Message(m) => m,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_reply_substitutes_command() {
        let line = parse_line("PING :tmi.twitch.tv\r\n").unwrap();
        assert_eq!(
            line,
            ServerLine::Ping {
                reply: "PONG :tmi.twitch.tv".into()
            }
        );
    }

    #[test]
    fn test_tagged_privmsg() {
        let m = message(
            "@badge-info=;display-name=Yuki;emotes=;user-id=1 \
             :yuki!yuki@yuki.tmi.twitch.tv PRIVMSG #somechannel :hello there",
        );
        assert_eq!(m.sender, "yuki");
        assert_eq!(m.channel, "somechannel");
        assert_eq!(m.text, "hello there");
        assert_eq!(m.display_name().as_deref(), Some("Yuki"));
        assert_eq!(m.emotes(), None);
    }

    #[test]
    fn test_untagged_privmsg_has_no_display_name() {
        let m = message(":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :hi: with colon");
        assert_eq!(m.sender, "bob");
        assert_eq!(m.text, "hi: with colon");
        assert_eq!(m.display_name(), None);
    }

    #[test]
    fn test_action_wrapper_is_removed() {
        let m = message(":bob!bob@host PRIVMSG #chan :\u{1}ACTION waves\u{1}");
        assert_eq!(m.text, "waves");
    }

    #[test]
    fn test_other_commands() {
        let line = parse_line(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!").unwrap();
        assert_eq!(line, ServerLine::Other { command: "001".into() });

        let line = parse_line(":justinfan1!justinfan1@justinfan1.tmi.twitch.tv JOIN #chan").unwrap();
        assert_eq!(line, ServerLine::Other { command: "JOIN".into() });
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_line("").is_err());
        assert!(parse_line("@only-tags").is_err());
        assert!(parse_line(":prefixonly").is_err());
        assert!(parse_line("PRIVMSG #chan :no prefix").is_err());
        assert!(parse_line(":nick!u@h PRIVMSG #chan").is_err());
    }

    #[test]
    fn test_unescape_tag_value() {
        assert_eq!(unescape_tag_value(r"Cool\sName"), "Cool Name");
        assert_eq!(unescape_tag_value(r"a\:b\\c"), "a;b\\c");
        assert_eq!(unescape_tag_value("trailing\\"), "trailing");
    }

    #[test]
    fn test_strip_single_emote() {
        assert_eq!(strip_emotes("Kappa hello", Some("25:0-4")), "hello");
    }

    #[test]
    fn test_strip_multiple_emotes_collapses_whitespace() {
        // "Kappa hi Kappa there PogChamp"
        let out = strip_emotes(
            "Kappa hi Kappa there PogChamp",
            Some("25:0-4,9-13/88:21-28"),
        );
        assert_eq!(out, "hi there");
    }

    #[test]
    fn test_strip_emotes_after_non_ascii_uses_utf16_indices() {
        // "é Kappa": é is one UTF-16 unit, Kappa spans 2..=6
        assert_eq!(strip_emotes("é Kappa", Some("25:2-6")), "é");
        // Surrogate pair: 😀 is two UTF-16 units, Kappa spans 3..=7
        assert_eq!(strip_emotes("😀 Kappa x", Some("25:3-7")), "😀 x");
    }

    #[test]
    fn test_strip_overlapping_ranges_equals_union() {
        let text = "abcdefghij";
        // Union of 2..=5 and 4..=7 is 2..=7
        assert_eq!(strip_emotes(text, Some("1:2-5/2:4-7")), "abij");
        // Adjacent ranges
        assert_eq!(strip_emotes(text, Some("1:0-2,3-4")), "fghij");
        // Nested range
        assert_eq!(strip_emotes(text, Some("1:1-8/2:3-4")), "aj");
    }

    #[test]
    fn test_strip_out_of_bounds_ranges_do_not_panic() {
        assert_eq!(strip_emotes("short", Some("1:3-99")), "sho");
        assert_eq!(strip_emotes("short", Some("1:50-60")), "short");
        assert_eq!(strip_emotes("short", Some("garbage/1:x-y/2:4-1")), "short");
    }

    #[test]
    fn test_strip_without_emotes_only_collapses_whitespace() {
        assert_eq!(strip_emotes("  a   b  ", None), "a b");
    }
}

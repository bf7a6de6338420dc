//! Voice selection: split text into runs that each get a single voice.
//!
//! Text → pronunciation rewrite → whitespace-preserving tokens → voice per
//! token → consecutive tokens with the same voice merged into one segment.
//! Whitespace never opens a new segment, so concatenating the segment texts
//! gives back the (rewritten) input exactly.

use super::pronunciation::PronunciationTable;
use super::script::is_alternate_script;

/// Words that glue the spoken name to the message. Always read in the
/// default voice, even inside a Japanese run.
const CONNECTOR_WORDS: &[&str] = &["says", "said", "writes", "wrote", "typed", "posted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voice {
    /// English voice.
    Default,
    /// Japanese voice.
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub voice: Voice,
}

impl Segment {
    fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            text: text.into(),
            voice,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    pronunciation: PronunciationTable,
}

impl Segmenter {
    pub fn new(pronunciation: PronunciationTable) -> Self {
        Self { pronunciation }
    }

    pub fn segment(&self, text: &str) -> Vec<Segment> {
        let text = self.pronunciation.apply(text);
        segment_text(&text)
    }
}

fn is_connector(token: &str) -> bool {
    CONNECTOR_WORDS.iter().any(|w| token.eq_ignore_ascii_case(w))
}

fn voice_for(token: &str) -> Voice {
    if !is_connector(token) && is_alternate_script(token) {
        Voice::Alternate
    } else {
        Voice::Default
    }
}

/// Split into alternating runs of whitespace and non-whitespace.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;

    for (i, c) in text.char_indices() {
        let space = c.is_whitespace();
        if in_space.is_some_and(|s| s != space) {
            tokens.push(&text[start..i]);
            start = i;
        }
        in_space = Some(space);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

fn is_space(token: &str) -> bool {
    token.chars().all(char::is_whitespace)
}

pub fn segment_text(text: &str) -> Vec<Segment> {
    let tokens = tokenize(text);
    let voices: Vec<Option<Voice>> = tokens
        .iter()
        .map(|t| (!is_space(t)).then(|| voice_for(t)))
        .collect();

    let has_default = voices.contains(&Some(Voice::Default));
    let has_alternate = voices.contains(&Some(Voice::Alternate));
    if !has_alternate {
        return vec![Segment::new(text, Voice::Default)];
    }
    if !has_default {
        return vec![Segment::new(text, Voice::Alternate)];
    }

    let mut segments = Vec::new();
    let mut phrase = String::new();
    // None while the open phrase holds only leading whitespace.
    let mut phrase_voice: Option<Voice> = None;

    for (token, voice) in tokens.into_iter().zip(voices) {
        let Some(voice) = voice else {
            phrase.push_str(token);
            continue;
        };
        match phrase_voice {
            Some(current) if current != voice => {
                segments.push(Segment::new(std::mem::take(&mut phrase), current));
                phrase_voice = Some(voice);
            }
            Some(_) => {}
            None => phrase_voice = Some(voice),
        }
        phrase.push_str(token);
    }

    if !phrase.is_empty() {
        segments.push(Segment::new(phrase, phrase_voice.unwrap_or(Voice::Default)));
    }
    segments
}

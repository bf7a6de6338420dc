//! Fixed rewrite table for romanized Japanese chat slang.
//!
//! Whole-word, case-insensitive. Surrounding punctuation and all whitespace
//! are preserved so the rewritten text still tokenizes the same way.

use std::collections::HashMap;

const BUILTIN: &[(&str, &str)] = &[
    ("arigato", "ありがとう"),
    ("arigatou", "ありがとう"),
    ("baka", "ばか"),
    ("desu", "です"),
    ("kanpai", "乾杯"),
    ("kawaii", "かわいい"),
    ("konbanwa", "こんばんは"),
    ("konnichiwa", "こんにちは"),
    ("nani", "なに"),
    ("ohayo", "おはよう"),
    ("ohayou", "おはよう"),
    ("otsukare", "おつかれ"),
    ("oyasumi", "おやすみ"),
    ("senpai", "先輩"),
    ("sensei", "先生"),
    ("sugoi", "すごい"),
    ("www", "笑"),
    ("yatta", "やった"),
];

#[derive(Debug, Clone, Default)]
pub struct PronunciationTable {
    entries: HashMap<String, String>,
}

impl PronunciationTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        if self.is_empty() {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut word = String::new();
        for c in text.chars() {
            if c.is_whitespace() {
                self.flush_word(&mut word, &mut out);
                out.push(c);
            } else {
                word.push(c);
            }
        }
        self.flush_word(&mut word, &mut out);
        out
    }

    fn flush_word(&self, word: &mut String, out: &mut String) {
        if word.is_empty() {
            return;
        }
        let core = word.trim_matches(|c: char| c.is_ascii_punctuation());
        match self.entries.get(&core.to_lowercase()) {
            Some(replacement) if !core.is_empty() => {
                let start = word.find(core).unwrap_or(0);
                out.push_str(&word[..start]);
                out.push_str(replacement);
                out.push_str(&word[start + core.len()..]);
            }
            _ => out.push_str(word),
        }
        word.clear();
    }
}

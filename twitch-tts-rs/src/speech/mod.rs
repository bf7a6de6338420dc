//! Speech side of the pipeline.
//!
//! - `script`: Japanese script detection
//! - `pronunciation`: romaji slang rewrite table
//! - `segmenter`: per-voice text segments
//! - `engine`: external TTS engines and lossless concat
//! - `synthesizer`: segments → one audio artifact
//! - `worker`: text queue consumer with sender cooldown

pub mod engine;
pub mod pronunciation;
pub mod script;
pub mod segmenter;
pub mod synthesizer;
pub mod worker;

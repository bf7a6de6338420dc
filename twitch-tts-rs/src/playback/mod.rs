//! Playback side of the pipeline: ducking, the player, and the burst worker.

pub mod ducker;
pub mod mixer;
pub mod player;
pub mod worker;

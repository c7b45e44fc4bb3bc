//! Replay agent: runs a recorded landmark stream through the full
//! analysis pipeline as if it were an uploaded video.

pub mod config;
pub mod replay;
pub mod report;
pub mod runner;

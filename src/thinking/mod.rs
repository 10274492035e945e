//! Reasoning transcripts: splitting a reply into thinking steps and a
//! final answer, and revealing the steps one at a time.
pub mod parser;
pub mod reveal;

pub use parser::{StreamingTranscript, ThinkingStep, Transcript, parse};
pub use reveal::{DEFAULT_REVEAL_INTERVAL, MIN_REVEAL_INTERVAL, RevealScheduler, RevealState};

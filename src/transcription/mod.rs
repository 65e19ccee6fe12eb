//! # Transcription Module
//!
//! Streaming speech recognition over an external service. The pipeline drains
//! the inbound frame queue into one long-lived bidirectional exchange and
//! surfaces only finalized transcripts; interim results never reach the
//! dialogue layer, so there is no mid-utterance barge-in.
//!
//! A recognition outage fails closed: the transcript sequence ends, the call's
//! turn-taking stops, and the media path keeps flowing untouched.

pub mod engine; // Recognition exchange client and pipeline

pub use engine::{RecognitionClient, TranscriptEvent, WsRecognitionClient};

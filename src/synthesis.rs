//! # Synthesis Pipeline
//!
//! Turns response text into an ordered sequence of fixed-size outbound frames.
//! The external synthesis service returns one raw mu-law byte blob per
//! utterance; the chunking into transport-sized frames happens here. A failed
//! synthesis yields no frames at all; callers treat "no chunks" as "nothing
//! to play", never as a reason to end the call.

use crate::audio::codec::MediaFrame;
use crate::call::session::LanguageProfile;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

/// Speech synthesis capability contract.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Synthesize one utterance as raw audio bytes at the transport's sample
    /// rate and encoding.
    async fn synthesize(&self, text: &str, profile: &LanguageProfile) -> AppResult<Vec<u8>>;
}

/// Request body sent to the synthesis service.
#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    language_code: &'a str,
    voice: &'a str,
    sample_rate: u32,
    encoding: &'a str,
}

/// HTTP-backed synthesis client.
pub struct HttpSynthesisClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    sample_rate: u32,
}

impl HttpSynthesisClient {
    pub fn new(http: reqwest::Client, url: String, api_key: String, sample_rate: u32) -> Self {
        Self {
            http,
            url,
            api_key,
            sample_rate,
        }
    }
}

#[async_trait]
impl SynthesisClient for HttpSynthesisClient {
    async fn synthesize(&self, text: &str, profile: &LanguageProfile) -> AppResult<Vec<u8>> {
        let request = SynthesisRequest {
            text,
            language_code: profile.synthesis_locale,
            voice: profile.voice,
            sample_rate: self.sample_rate,
            encoding: "mulaw",
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Synthesis(e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::Synthesis(e.to_string()))?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| AppError::Synthesis(e.to_string()))?;

        Ok(audio.to_vec())
    }
}

/// Synthesize one utterance and cut it into transport-sized frames.
///
/// On service failure this logs and returns an empty sequence; the utterance
/// degrades to silence instead of crashing or hanging the call.
pub async fn synthesize_chunks(
    client: &dyn SynthesisClient,
    text: &str,
    profile: &LanguageProfile,
    chunk_bytes: usize,
) -> Vec<MediaFrame> {
    let audio = match client.synthesize(text, profile).await {
        Ok(audio) => audio,
        Err(e) => {
            error!(voice = profile.voice, "Synthesis failed, skipping utterance: {}", e);
            return Vec::new();
        }
    };

    let frames: Vec<MediaFrame> = audio
        .chunks(chunk_bytes)
        .map(|chunk| MediaFrame::new(chunk.to_vec()))
        .collect();

    debug!(
        bytes = audio.len(),
        frames = frames.len(),
        voice = profile.voice,
        "Synthesized utterance"
    );

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::session::profile_for;

    /// Fake client returning a fixed payload.
    struct FixedAudio(Vec<u8>);

    #[async_trait]
    impl SynthesisClient for FixedAudio {
        async fn synthesize(&self, _text: &str, _profile: &LanguageProfile) -> AppResult<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    /// Fake client that always fails.
    struct Unavailable;

    #[async_trait]
    impl SynthesisClient for Unavailable {
        async fn synthesize(&self, _text: &str, _profile: &LanguageProfile) -> AppResult<Vec<u8>> {
            Err(AppError::Synthesis("service down".to_string()))
        }
    }

    /// A 5000-byte payload with chunk size 2048 yields [2048, 2048, 904].
    #[tokio::test]
    async fn test_chunk_sizes() {
        let client = FixedAudio(vec![0u8; 5000]);
        let frames = synthesize_chunks(&client, "hello", profile_for("English"), 2048).await;

        let sizes: Vec<usize> = frames.iter().map(|f| f.len()).collect();
        assert_eq!(sizes, vec![2048, 2048, 904]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_tail() {
        let client = FixedAudio(vec![0u8; 4096]);
        let frames = synthesize_chunks(&client, "hello", profile_for("English"), 2048).await;
        let sizes: Vec<usize> = frames.iter().map(|f| f.len()).collect();
        assert_eq!(sizes, vec![2048, 2048]);
    }

    /// Service failure degrades to an empty sequence, not an error.
    #[tokio::test]
    async fn test_failure_yields_empty_sequence() {
        let frames = synthesize_chunks(&Unavailable, "hello", profile_for("English"), 2048).await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_empty_audio_yields_empty_sequence() {
        let client = FixedAudio(Vec::new());
        let frames = synthesize_chunks(&client, "hello", profile_for("English"), 2048).await;
        assert!(frames.is_empty());
    }
}

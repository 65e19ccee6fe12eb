//! # Streaming Recognition Engine
//!
//! Drives one streaming recognition exchange per call: a WebSocket to the
//! recognition service that is fed audio frames from the inbound queue and
//! answers with transcript events. The pipeline runs on its own task; the
//! returned receiver is the lazy sequence of finalized transcripts, ending
//! when the inbound queue yields its sentinel or the exchange reports a
//! terminal error.

use crate::audio::queue::FrameReceiver;
use crate::call::session::LanguageProfile;
use crate::error::AppError;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// One transcript event from the recognition service.
///
/// Events without `is_final` are interim results and are discarded by design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub transcript: String,
    #[serde(default)]
    pub is_final: bool,
}

/// Opening config frame of a recognition exchange.
#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    event: &'a str,
    language: &'a str,
    sample_rate: u32,
    encoding: &'a str,
    interim_results: bool,
}

/// Streaming recognition capability contract.
///
/// `start` consumes the inbound queue and returns the finalized-transcript
/// sequence; the implementation owns the exchange for the rest of the call.
pub trait RecognitionClient: Send + Sync {
    fn start(
        &self,
        profile: &'static LanguageProfile,
        audio: FrameReceiver,
    ) -> mpsc::UnboundedReceiver<String>;
}

/// WebSocket-backed recognition client.
pub struct WsRecognitionClient {
    url: String,
    sample_rate: u32,
}

impl WsRecognitionClient {
    pub fn new(url: String, sample_rate: u32) -> Self {
        Self { url, sample_rate }
    }
}

impl RecognitionClient for WsRecognitionClient {
    fn start(
        &self,
        profile: &'static LanguageProfile,
        audio: FrameReceiver,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.url.clone();
        let sample_rate = self.sample_rate;

        tokio::spawn(run_exchange(url, sample_rate, profile, audio, tx));

        rx
    }
}

/// Run one full recognition exchange. Dropping `transcripts` ends the
/// sequence; dropping `audio` (on any early exit) detaches the inbound queue
/// so the receive loop notices and stops forwarding frames.
async fn run_exchange(
    url: String,
    sample_rate: u32,
    profile: &'static LanguageProfile,
    mut audio: FrameReceiver,
    transcripts: mpsc::UnboundedSender<String>,
) {
    let (ws, _) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(e) => {
            let err = AppError::Recognition(format!("connect failed: {}", e));
            error!(language = profile.recognition_locale, "{}", err);
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();

    let start = StartRequest {
        event: "start",
        language: profile.recognition_locale,
        sample_rate,
        encoding: "mulaw",
        interim_results: false,
    };
    let start_json = match serde_json::to_string(&start) {
        Ok(json) => json,
        Err(e) => {
            error!("Recognition start frame serialization failed: {}", e);
            return;
        }
    };
    if let Err(e) = sink.send(Message::Text(start_json)).await {
        error!("Recognition start frame send failed: {}", e);
        return;
    }

    info!(language = profile.recognition_locale, "Recognition exchange opened");

    // Feeder: drain the inbound queue into the exchange until the sentinel,
    // then tell the service no more audio is coming.
    let feeder = tokio::spawn(async move {
        while let Some(frame) = audio.recv().await {
            if sink
                .send(Message::Binary(frame.as_bytes().to_vec()))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sink.send(Message::Text(r#"{"event":"stop"}"#.to_string())).await;
        let _ = sink.close().await;
    });

    // Reader: forward finalized transcripts until the exchange ends. A
    // service error fails closed: the sequence ends, media keeps flowing.
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<TranscriptEvent>(&text) {
                Ok(event) if event.is_final => {
                    let transcript = event.transcript.trim().to_string();
                    if transcript.is_empty() {
                        continue;
                    }
                    info!(%transcript, "Finalized transcript");
                    if transcripts.send(transcript).is_err() {
                        break;
                    }
                }
                Ok(_) => debug!("Discarding interim result"),
                Err(e) => warn!("Unparseable recognition event: {}", e),
            },
            Ok(Message::Close(_)) => {
                debug!("Recognition exchange closed by service");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let err = AppError::Recognition(e.to_string());
                error!("{}, ending transcription for this call", err);
                break;
            }
        }
    }

    feeder.abort();
    info!(language = profile.recognition_locale, "Recognition exchange finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::MediaFrame;
    use crate::audio::queue::frame_channel;
    use crate::call::session::profile_for;

    /// Fake recognition client that turns every inbound frame into one
    /// transcript, preserving order.
    struct EchoRecognition;

    impl RecognitionClient for EchoRecognition {
        fn start(
            &self,
            _profile: &'static LanguageProfile,
            mut audio: FrameReceiver,
        ) -> mpsc::UnboundedReceiver<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(frame) = audio.recv().await {
                    if tx.send(format!("frame-{}", frame.as_bytes()[0])).is_err() {
                        break;
                    }
                }
            });
            rx
        }
    }

    #[test]
    fn test_transcript_event_parsing() {
        let event: TranscriptEvent =
            serde_json::from_str(r#"{"transcript": "yes I will be there", "is_final": true}"#)
                .unwrap();
        assert!(event.is_final);
        assert_eq!(event.transcript, "yes I will be there");

        // Events without the flag are interim
        let interim: TranscriptEvent =
            serde_json::from_str(r#"{"transcript": "yes I"}"#).unwrap();
        assert!(!interim.is_final);
    }

    /// Transcript order equals frame push order, and the sequence ends once
    /// the inbound queue yields its sentinel.
    #[tokio::test]
    async fn test_transcripts_follow_frame_order() {
        let (mut tx, rx) = frame_channel();
        for i in 0..5u8 {
            tx.send(MediaFrame::new(vec![i])).unwrap();
        }
        tx.finish();

        let mut transcripts = EchoRecognition.start(profile_for("English"), rx);

        let mut seen = Vec::new();
        while let Some(transcript) = transcripts.recv().await {
            seen.push(transcript);
        }
        assert_eq!(
            seen,
            vec!["frame-0", "frame-1", "frame-2", "frame-3", "frame-4"]
        );
    }
}

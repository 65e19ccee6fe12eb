//! # Transport Frame Codec
//!
//! Decodes and encodes the JSON media events exchanged with the telephony
//! transport. Inbound `media` payloads are base64-encoded mu-law audio; a
//! payload that fails to decode is reported as a frame error so the caller can
//! drop that single frame and keep the call alive.

use crate::error::AppError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One opaque block of encoded call audio.
///
/// Frames carry no identity beyond their position in the stream; the queues
/// and tasks moving them around must preserve arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    bytes: Vec<u8>,
}

impl MediaFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Base64 media payload wrapper used by the transport protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
}

/// Typed event stream of the telephony transport.
///
/// Incoming events: `connected` (carries the stream id), `media` (one audio
/// frame), `stop` (remote side is done). Outgoing traffic reuses the `media`
/// variant with the stream id filled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TransportEvent {
    Connected {
        #[serde(rename = "streamId")]
        stream_id: String,
    },
    Media {
        #[serde(rename = "streamId", default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        media: MediaPayload,
    },
    Stop,
}

/// Decode one inbound media payload into a frame.
///
/// Malformed base64 and empty payloads are decode errors; the session drops
/// the frame and continues.
pub fn decode_media(payload: &str) -> Result<MediaFrame, AppError> {
    if payload.is_empty() {
        return Err(AppError::FrameDecode("empty media payload".to_string()));
    }

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| AppError::FrameDecode(format!("invalid base64 payload: {}", e)))?;

    if bytes.is_empty() {
        return Err(AppError::FrameDecode("media payload decoded to zero bytes".to_string()));
    }

    Ok(MediaFrame::new(bytes))
}

/// Encode one outbound frame as a transport media event, ready to send.
pub fn encode_media(stream_id: &str, frame: &MediaFrame) -> String {
    let event = TransportEvent::Media {
        stream_id: Some(stream_id.to_string()),
        media: MediaPayload {
            payload: BASE64.encode(frame.as_bytes()),
        },
    };

    // The event type serializes infallibly: plain strings, no maps with
    // non-string keys.
    serde_json::to_string(&event).expect("transport event serialization")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_payload() {
        let payload = BASE64.encode(b"\x7f\x7f\x00\x01");
        let frame = decode_media(&payload).unwrap();
        assert_eq!(frame.as_bytes(), b"\x7f\x7f\x00\x01");
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        assert!(matches!(
            decode_media("not-base64!!!"),
            Err(AppError::FrameDecode(_))
        ));
        assert!(matches!(decode_media(""), Err(AppError::FrameDecode(_))));
    }

    #[test]
    fn test_encode_round_trip() {
        let frame = MediaFrame::new(vec![0u8, 127, 255]);
        let wire = encode_media("MZ1234", &frame);

        let event: TransportEvent = serde_json::from_str(&wire).unwrap();
        match event {
            TransportEvent::Media { stream_id, media } => {
                assert_eq!(stream_id.as_deref(), Some("MZ1234"));
                assert_eq!(decode_media(&media.payload).unwrap(), frame);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_transport_event_parsing() {
        let connected: TransportEvent =
            serde_json::from_str(r#"{"event":"connected","streamId":"MZ99"}"#).unwrap();
        assert!(matches!(
            connected,
            TransportEvent::Connected { ref stream_id } if stream_id == "MZ99"
        ));

        let stop: TransportEvent = serde_json::from_str(r#"{"event":"stop"}"#).unwrap();
        assert!(matches!(stop, TransportEvent::Stop));

        // Inbound media events may omit the stream id
        let media: TransportEvent =
            serde_json::from_str(r#"{"event":"media","media":{"payload":"AAA="}}"#).unwrap();
        assert!(matches!(media, TransportEvent::Media { stream_id: None, .. }));
    }
}

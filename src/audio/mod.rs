//! # Telephony Audio Module
//!
//! Everything that touches raw call audio: the wire codec for transport media
//! events, the sentinel-terminated frame queues that connect the per-call
//! tasks, and the best-effort per-direction archive.
//!
//! ## Audio Format:
//! - **Sample Rate**: 8kHz (telephony)
//! - **Encoding**: mu-law, 8-bit
//! - **Channels**: Mono (1 channel)
//!
//! Frames are opaque fixed-size blocks of encoded audio; their only identity
//! is their position in the stream, and per-direction ordering is preserved
//! from the transport all the way into the recognition exchange (inbound) and
//! from synthesis all the way back to the transport (outbound).

pub mod archive; // Per-call WAV archive, best-effort
pub mod codec;   // Transport event decode/encode
pub mod queue;   // Sentinel-terminated frame queues

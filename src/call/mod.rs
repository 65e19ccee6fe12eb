//! # Call Orchestration Module
//!
//! Owns the lifecycle of one live call: the WebSocket receive loop over the
//! telephony media stream, the per-call session record, and the two worker
//! tasks (speech pipeline and outbound relay) wired together through the
//! frame queues.
//!
//! ## Per-call task layout:
//! - **Receive loop** (the ws actor): decodes inbound media events, feeds the
//!   inbound queue, archives the inbound leg
//! - **Speech pipeline task**: recognition exchange → dialogue policy →
//!   synthesis → outbound queue
//! - **Outbound relay task**: drains the outbound queue back to the
//!   transport, archives the outbound leg
//!
//! Cross-task communication happens only through the two queues and actor
//! messages; the session record is moved into the speech pipeline task, which
//! is its only writer after setup.

pub mod controller; // WebSocket actor and per-call tasks
pub mod session;    // Session record and language profiles

pub use controller::call_stream;

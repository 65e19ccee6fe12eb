//! # Error Handling
//!
//! This module defines custom error types and how they're converted to HTTP responses.
//!
//! ## Error containment policy:
//! External-capability failures are contained at the component boundary and
//! converted to a safe default or no-op. Only a transport failure ends a call:
//! - `Recognition`: ends transcription for that call only, media keeps flowing
//! - `Synthesis`: the affected utterance is skipped (silence, not a crash)
//! - `Reasoning` / `DecisionParse`: replaced by a fixed fallback decision
//! - `Store` / `Archive`: logged, never fatal
//!
//! The HTTP mappings below only matter for the management endpoints; the call
//! path never surfaces these errors to the transport.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **Transport**: telephony media session failures (tears the call down)
/// - **FrameDecode**: one malformed media frame (dropped, call continues)
/// - **Recognition/Synthesis/Reasoning**: external capability outages
/// - **DecisionParse**: reasoning output did not contain a usable decision
/// - **Store/Archive**: best-effort side effects that failed
/// - **Config/BadRequest/Validation**: management API problems
#[derive(Debug)]
pub enum AppError {
    /// Telephony media session failure
    Transport(String),

    /// A single inbound media frame could not be decoded
    FrameDecode(String),

    /// Streaming recognition service failure
    Recognition(String),

    /// Speech synthesis service failure
    Synthesis(String),

    /// Conversational reasoning service failure
    Reasoning(String),

    /// Reasoning output carried no parseable decision payload
    DecisionParse(String),

    /// Appointment store read/write failure
    Store(String),

    /// Audio archive open/write/close failure
    Archive(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// User input failed validation rules
    ValidationError(String),

    /// Internal server errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::FrameDecode(msg) => write!(f, "Frame decode error: {}", msg),
            AppError::Recognition(msg) => write!(f, "Recognition service error: {}", msg),
            AppError::Synthesis(msg) => write!(f, "Synthesis service error: {}", msg),
            AppError::Reasoning(msg) => write!(f, "Reasoning service error: {}", msg),
            AppError::DecisionParse(msg) => write!(f, "Decision parse error: {}", msg),
            AppError::Store(msg) => write!(f, "Appointment store error: {}", msg),
            AppError::Archive(msg) => write!(f, "Archive error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Converts errors into HTTP responses for the management endpoints.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Port must be greater than 0",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AppError::FrameDecode(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "frame_decode_error",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::Transport(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "transport_error",
                msg.clone(),
            ),
            AppError::Recognition(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "recognition_error",
                msg.clone(),
            ),
            AppError::Synthesis(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "synthesis_error",
                msg.clone(),
            ),
            AppError::Reasoning(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "reasoning_error",
                msg.clone(),
            ),
            AppError::Store(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "store_error",
                msg.clone(),
            ),
            AppError::DecisionParse(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "decision_parse_error",
                msg.clone(),
            ),
            AppError::Archive(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "archive_error",
                msg.clone(),
            ),
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing failures on management endpoints are the client's fault.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;

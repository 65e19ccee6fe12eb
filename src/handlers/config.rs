use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "channels": config.audio.channels,
                "chunk_bytes": config.audio.chunk_bytes
            },
            "services": {
                "recognition_url": config.services.recognition_url,
                "synthesis_url": config.services.synthesis_url,
                "reasoning_url": config.services.reasoning_url
            },
            "archive": {
                "enabled": config.archive.enabled,
                "directory": config.archive.directory
            },
            "calls": {
                "max_concurrent_calls": config.calls.max_concurrent_calls,
                "default_language": config.calls.default_language
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": {
            "server": {
                "host": current_config.server.host,
                "port": current_config.server.port
            },
            "audio": {
                "sample_rate": current_config.audio.sample_rate,
                "channels": current_config.audio.channels,
                "chunk_bytes": current_config.audio.chunk_bytes
            },
            "archive": {
                "enabled": current_config.archive.enabled,
                "directory": current_config.archive.directory
            },
            "calls": {
                "max_concurrent_calls": current_config.calls.max_concurrent_calls,
                "default_language": current_config.calls.default_language
            }
        }
    })))
}

//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, audio, services, ...)
/// makes it easier to understand and maintain as the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub services: ServicesConfig,
    pub store: StoreConfig,
    pub archive: ArchiveConfig,
    pub calls: CallsConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Telephony audio format settings.
///
/// The transport delivers mu-law encoded mono audio. `chunk_bytes` is the size
/// of the outbound frames cut from each synthesized utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_bytes: usize,
}

/// Endpoints for the three external speech/reasoning capabilities.
///
/// ## Fields:
/// - `recognition_url`: WebSocket endpoint of the streaming recognition service
/// - `synthesis_url`: HTTP endpoint of the speech synthesis service
/// - `reasoning_url`: HTTP endpoint of the conversational reasoning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub recognition_url: String,
    pub synthesis_url: String,
    pub reasoning_url: String,
    pub api_key: String,
}

/// Appointment store (REST) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Per-call audio archival settings.
///
/// Archival is best-effort: the call proceeds even when the archive directory
/// is missing or writes fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub directory: String,
}

/// Call handling limits and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsConfig {
    pub max_concurrent_calls: usize,
    pub default_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                sample_rate: 8000, // Telephony mu-law rate
                channels: 1,       // Mono audio
                chunk_bytes: 2048, // Outbound frame size
            },
            services: ServicesConfig {
                recognition_url: "ws://127.0.0.1:9010/recognize".to_string(),
                synthesis_url: "http://127.0.0.1:9011/synthesize".to_string(),
                reasoning_url: "http://127.0.0.1:9012/generate".to_string(),
                api_key: String::new(),
            },
            store: StoreConfig {
                base_url: "http://127.0.0.1:9020/rest/v1".to_string(),
                api_key: String::new(),
            },
            archive: ArchiveConfig {
                enabled: true,
                directory: "audio_logs".to_string(),
            },
            calls: CallsConfig {
                max_concurrent_calls: 10,
                default_language: "English".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVICES_RECOGNITION_URL=wss://stt.example/v1`: Override a service endpoint
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## Why validate:
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.chunk_bytes == 0 {
            return Err(anyhow::anyhow!("Audio chunk size must be greater than 0"));
        }

        if self.calls.max_concurrent_calls == 0 {
            return Err(anyhow::anyhow!("Max concurrent calls must be greater than 0"));
        }

        if self.archive.enabled && self.archive.directory.is_empty() {
            return Err(anyhow::anyhow!(
                "Archive directory must be set when archival is enabled"
            ));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// This method allows updating only some fields, not the entire configuration.
    /// For example, you can send just `{"server": {"port": 9000}}` to change only the port.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = audio.get("sample_rate").and_then(|v| v.as_u64()) {
                self.audio.sample_rate = rate as u32;
            }
            if let Some(chunk) = audio.get("chunk_bytes").and_then(|v| v.as_u64()) {
                self.audio.chunk_bytes = chunk as usize;
            }
        }

        if let Some(calls) = partial_config.get("calls") {
            if let Some(max) = calls.get("max_concurrent_calls").and_then(|v| v.as_u64()) {
                self.calls.max_concurrent_calls = max as usize;
            }
            if let Some(language) = calls.get("default_language").and_then(|v| v.as_str()) {
                self.calls.default_language = language.to_string();
            }
        }

        if let Some(archive) = partial_config.get("archive") {
            if let Some(enabled) = archive.get("enabled").and_then(|v| v.as_bool()) {
                self.archive.enabled = enabled;
            }
            if let Some(directory) = archive.get("directory").and_then(|v| v.as_str()) {
                self.archive.directory = directory.to_string();
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.sample_rate, 8000);
        assert_eq!(config.audio.chunk_bytes, 2048);
        assert_eq!(config.calls.default_language, "English");
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.chunk_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.archive.directory = String::new();
        assert!(config.validate().is_err());
    }

    /// Test that runtime configuration updates work correctly.
    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 9090}, "calls": {"max_concurrent_calls": 3}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.calls.max_concurrent_calls, 3);
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.audio.chunk_bytes, 2048);
    }

    /// Invalid partial updates are rejected and leave validation intact.
    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"audio": {"chunk_bytes": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}

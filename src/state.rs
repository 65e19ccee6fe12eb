//! # Application State Management
//!
//! Shared state accessed by HTTP handlers and call controllers: the runtime
//! configuration, service-wide metrics, and the external capability clients
//! every call borrows.
//!
//! ## Thread Safety Pattern:
//! Mutable data lives behind `Arc<RwLock<T>>`: many readers or one writer at
//! a time, cloned out rather than held across await points. The capability
//! clients are immutable after startup and shared as plain `Arc`s.

use crate::config::AppConfig;
use crate::dialogue::{HttpReasoningClient, ReasoningClient};
use crate::store::{AppointmentStore, RestAppointmentStore};
use crate::synthesis::{HttpSynthesisClient, SynthesisClient};
use crate::transcription::{RecognitionClient, WsRecognitionClient};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The external capability clients shared by every call.
pub struct ServiceClients {
    pub recognition: Arc<dyn RecognitionClient>,
    pub synthesis: Arc<dyn SynthesisClient>,
    pub reasoning: Arc<dyn ReasoningClient>,
    pub store: Arc<dyn AppointmentStore>,
}

impl ServiceClients {
    /// Build the production wire clients from configuration. One reqwest
    /// client is shared across the HTTP-backed capabilities.
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::new();

        Self {
            recognition: Arc::new(WsRecognitionClient::new(
                config.services.recognition_url.clone(),
                config.audio.sample_rate,
            )),
            synthesis: Arc::new(HttpSynthesisClient::new(
                http.clone(),
                config.services.synthesis_url.clone(),
                config.services.api_key.clone(),
                config.audio.sample_rate,
            )),
            reasoning: Arc::new(HttpReasoningClient::new(
                http.clone(),
                config.services.reasoning_url.clone(),
                config.services.api_key.clone(),
            )),
            store: Arc::new(RestAppointmentStore::new(
                http,
                config.store.base_url.clone(),
                config.store.api_key.clone(),
            )),
        }
    }
}

/// The main application state shared across all HTTP request handlers and
/// call controllers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Service-wide metrics, updated by middleware and call controllers
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// External capability clients
    pub services: Arc<ServiceClients>,

    /// When the server started
    pub start_time: Instant,
}

/// Performance metrics collected across all requests and calls.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Current number of live call sessions
    pub active_calls: u32,

    /// Total number of call sessions accepted since server start
    pub calls_started: u64,

    /// Detailed metrics for each API endpoint
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let services = Arc::new(ServiceClients::from_config(&config));
        Self::with_services(config, services)
    }

    /// Construct with explicit clients; tests substitute fakes here.
    pub fn with_services(config: AppConfig, services: Arc<ServiceClients>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            services,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately so other threads aren't blocked;
    /// AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A new call session was accepted.
    pub fn begin_call(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_calls += 1;
        metrics.calls_started += 1;
    }

    /// A call session reached Closed.
    pub fn end_call(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_calls > 0 {
            metrics.active_calls -= 1;
        }
    }

    pub fn active_calls(&self) -> u32 {
        self.metrics.read().unwrap().active_calls
    }

    /// Snapshot of current metrics for the /metrics endpoint. Cloned so no
    /// lock is held while serializing the response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_calls: metrics.active_calls,
            calls_started: metrics.calls_started,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_gauge_never_underflows() {
        let state = AppState::new(AppConfig::default());
        state.begin_call();
        state.end_call();
        state.end_call(); // extra end must not wrap the gauge
        assert_eq!(state.active_calls(), 0);
        assert_eq!(state.get_metrics_snapshot().calls_started, 1);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_validates() {
        let state = AppState::new(AppConfig::default());
        let mut bad = AppConfig::default();
        bad.server.port = 0;
        assert!(state.update_config(bad).is_err());

        let mut good = AppConfig::default();
        good.server.port = 9000;
        assert!(state.update_config(good).is_ok());
        assert_eq!(state.get_config().server.port, 9000);
    }
}

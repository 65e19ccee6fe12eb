//! # Appointment Store
//!
//! Narrow fetch/update contract over the appointment records that calls are
//! made about. The store lives behind a REST gateway; the core only ever reads
//! one record per call and writes its `status` field as the side effect of a
//! dialogue decision. Both operations may fail and neither failure is fatal to
//! a call; callers log and continue.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One appointment row as the store returns it.
///
/// Only `status` is ever written by this service; the attempt counters and
/// phone numbers belong to the external dialing scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub appointment_id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
    #[serde(default)]
    pub appointment_datetime: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub patient_call_attempts: Option<u32>,
    #[serde(default)]
    pub emergency_call_attempts: Option<u32>,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

/// Fetch/update contract consumed by the call pipeline.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Fetch one record by appointment id. `Ok(None)` means the id is unknown.
    async fn fetch(&self, appointment_id: &str) -> AppResult<Option<AppointmentRecord>>;

    /// Overwrite the record's status. Repeating the same status is a repeated
    /// write, not an error.
    async fn update_status(&self, appointment_id: &str, status: &str) -> AppResult<()>;
}

/// REST-backed store client (PostgREST-style filter syntax).
pub struct RestAppointmentStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestAppointmentStore {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    fn records_url(&self, appointment_id: &str) -> String {
        format!(
            "{}/master_appointments?appointment_id=eq.{}",
            self.base_url.trim_end_matches('/'),
            appointment_id
        )
    }
}

#[async_trait]
impl AppointmentStore for RestAppointmentStore {
    async fn fetch(&self, appointment_id: &str) -> AppResult<Option<AppointmentRecord>> {
        let response = self
            .http
            .get(self.records_url(appointment_id))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Store(format!("fetch {}: {}", appointment_id, e)))?
            .error_for_status()
            .map_err(|e| AppError::Store(format!("fetch {}: {}", appointment_id, e)))?;

        let mut records: Vec<AppointmentRecord> = response
            .json()
            .await
            .map_err(|e| AppError::Store(format!("decode {}: {}", appointment_id, e)))?;

        if records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(records.remove(0)))
        }
    }

    async fn update_status(&self, appointment_id: &str, status: &str) -> AppResult<()> {
        self.http
            .patch(self.records_url(appointment_id))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await
            .map_err(|e| AppError::Store(format!("update {}: {}", appointment_id, e)))?
            .error_for_status()
            .map_err(|e| AppError::Store(format!("update {}: {}", appointment_id, e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deserialization() {
        let json = r#"{
            "appointment_id": "apt-42",
            "patient_name": "Amina Bello",
            "patient_phone": "+2348012345678",
            "appointment_datetime": "2025-03-04T10:00:00Z",
            "status": "pending",
            "patient_call_attempts": 1,
            "preferred_language": "Hausa"
        }"#;

        let record: AppointmentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.appointment_id, "apt-42");
        assert_eq!(record.patient_name.as_deref(), Some("Amina Bello"));
        assert_eq!(record.preferred_language.as_deref(), Some("Hausa"));
        assert_eq!(record.patient_call_attempts, Some(1));
        // Fields the store did not send come back as None
        assert!(record.emergency_contact_phone.is_none());
    }

    #[test]
    fn test_records_url_filter() {
        let store = RestAppointmentStore::new(
            reqwest::Client::new(),
            "http://store.local/rest/v1/".to_string(),
            "key".to_string(),
        );
        assert_eq!(
            store.records_url("apt-7"),
            "http://store.local/rest/v1/master_appointments?appointment_id=eq.apt-7"
        );
    }
}

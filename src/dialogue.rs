//! # Dialogue Policy Engine
//!
//! One finalized transcript in, one spoken response out. Each turn appends the
//! patient's words to the session history, asks the reasoning service for a
//! structured decision, applies the decision's side effect to the appointment
//! record, and appends the agent's response. The reasoning service returns
//! free-form text that is expected to embed a JSON object, possibly wrapped
//! in markdown fences, so the payload is located and parsed defensively.
//!
//! A turn can never fail: any reasoning or parsing problem collapses to a
//! fixed clarify-and-apologize decision so the call keeps moving.

use crate::call::session::CallSession;
use crate::error::{AppError, AppResult};
use crate::store::AppointmentStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Closed set of actions the reasoning service may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Confirm,
    Reschedule,
    Clarify,
}

impl Intent {
    /// Appointment status written when this intent triggers a store update.
    pub fn status_update(&self) -> Option<&'static str> {
        match self {
            Intent::Confirm => Some("confirmed"),
            Intent::Reschedule => Some("rescheduled"),
            Intent::Clarify => None,
        }
    }
}

/// Structured outcome of one dialogue turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueDecision {
    pub intent: Intent,
    pub response_text: String,
}

impl DialogueDecision {
    /// Fixed fail-safe used whenever the reasoning step cannot produce a
    /// usable decision.
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Clarify,
            response_text: "I'm sorry, I'm having a little trouble at the moment. \
                            Someone from our team will call you back shortly."
                .to_string(),
        }
    }
}

/// Conversational reasoning capability contract.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Generate free-form text for the given prompt.
    async fn generate(&self, prompt: &str) -> AppResult<String>;
}

/// HTTP-backed reasoning client.
pub struct HttpReasoningClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

impl HttpReasoningClient {
    pub fn new(http: reqwest::Client, url: String, api_key: String) -> Self {
        Self { http, url, api_key }
    }
}

#[async_trait]
impl ReasoningClient for HttpReasoningClient {
    async fn generate(&self, prompt: &str) -> AppResult<String> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| AppError::Reasoning(e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::Reasoning(e.to_string()))?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Reasoning(e.to_string()))?;

        Ok(body.text)
    }
}

/// The decision JSON the reasoning service is asked to produce.
#[derive(Debug, Deserialize)]
struct DecisionPayload {
    intent: Intent,
    response_text: String,
}

/// Locate and parse the decision object inside free-form reasoning output.
///
/// The payload may arrive bare, inside markdown fences, or surrounded by
/// prose; everything from the first `{` to the last `}` is treated as the
/// candidate object.
pub fn parse_decision(raw: &str) -> AppResult<DialogueDecision> {
    let start = raw
        .find('{')
        .ok_or_else(|| AppError::DecisionParse("no JSON object in response".to_string()))?;
    let end = raw
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| AppError::DecisionParse("unterminated JSON object".to_string()))?;

    let payload: DecisionPayload = serde_json::from_str(&raw[start..=end])
        .map_err(|e| AppError::DecisionParse(e.to_string()))?;

    if payload.response_text.trim().is_empty() {
        return Err(AppError::DecisionParse("empty response_text".to_string()));
    }

    Ok(DialogueDecision {
        intent: payload.intent,
        response_text: payload.response_text,
    })
}

/// Per-call dialogue policy: reasoning plus the appointment side effect.
pub struct DialoguePolicy {
    reasoning: Arc<dyn ReasoningClient>,
    store: Arc<dyn AppointmentStore>,
}

impl DialoguePolicy {
    pub fn new(reasoning: Arc<dyn ReasoningClient>, store: Arc<dyn AppointmentStore>) -> Self {
        Self { reasoning, store }
    }

    /// Run one dialogue turn.
    ///
    /// Appends the transcript as a patient turn, asks the reasoning service
    /// for a decision, performs at most one appointment-status update, and
    /// appends the response as an agent turn. Never returns an error: failed
    /// reasoning degrades to the fixed fallback decision.
    pub async fn decide(&self, transcript: &str, session: &mut CallSession) -> DialogueDecision {
        session.push_patient_turn(transcript);

        let prompt = build_prompt(session, transcript);
        let decision = match self.reasoning.generate(&prompt).await {
            Ok(raw) => parse_decision(&raw).unwrap_or_else(|e| {
                warn!(call_id = %session.call_id, "Unusable reasoning output: {}", e);
                DialogueDecision::fallback()
            }),
            Err(e) => {
                error!(call_id = %session.call_id, "Reasoning service failed: {}", e);
                DialogueDecision::fallback()
            }
        };

        if let Some(status) = decision.intent.status_update() {
            info!(
                call_id = %session.call_id,
                appointment_id = %session.appointment_id,
                intent = ?decision.intent,
                status,
                "Applying appointment update"
            );
            if let Err(e) = self
                .store
                .update_status(&session.appointment_id, status)
                .await
            {
                // Non-blocking: the spoken response still goes out
                error!(appointment_id = %session.appointment_id, "Status update failed: {}", e);
            }
        }

        session.push_agent_turn(&decision.response_text);
        decision
    }
}

/// Build the reasoning prompt from the appointment facts and the full turn
/// history.
fn build_prompt(session: &CallSession, last_message: &str) -> String {
    let patient_name = session
        .appointment
        .as_ref()
        .and_then(|record| record.patient_name.as_deref())
        .unwrap_or("the patient");
    let appointment_datetime = session
        .appointment
        .as_ref()
        .and_then(|record| record.appointment_datetime.as_deref())
        .unwrap_or("their upcoming appointment");

    let mut history = String::new();
    for turn in session.history() {
        history.push_str(&format!("{:?}: {}\n", turn.role, turn.text));
    }

    format!(
        "You are a friendly, efficient assistant calling to confirm a medical \
         appointment, or to help reschedule it.\n\
         Keep spoken responses short, clear, and to the point.\n\n\
         PATIENT AND APPOINTMENT CONTEXT:\n\
         - Patient name: {patient_name}\n\
         - Appointment: {appointment_datetime}\n\
         - Preferred language: {language}\n\n\
         Analyze the patient's last message and the conversation history, then \
         return a JSON object with two keys:\n\
         - \"intent\": one of \"confirm\", \"reschedule\", or \"clarify\"\n\
         - \"response_text\": the exact words to say to the patient, in their \
         preferred language\n\n\
         CONVERSATION HISTORY:\n{history}\n\
         Patient's last message: \"{last_message}\"\n\n\
         Your JSON response:",
        patient_name = patient_name,
        appointment_datetime = appointment_datetime,
        language = session.language,
        history = history,
        last_message = last_message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AppointmentRecord;
    use std::sync::Mutex;

    /// Reasoning fake that replays a canned response.
    struct CannedReasoning(String);

    #[async_trait]
    impl ReasoningClient for CannedReasoning {
        async fn generate(&self, _prompt: &str) -> AppResult<String> {
            Ok(self.0.clone())
        }
    }

    /// Reasoning fake that always fails.
    struct DownReasoning;

    #[async_trait]
    impl ReasoningClient for DownReasoning {
        async fn generate(&self, _prompt: &str) -> AppResult<String> {
            Err(AppError::Reasoning("timeout".to_string()))
        }
    }

    /// Store fake that records every status write.
    #[derive(Default)]
    struct RecordingStore {
        updates: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AppointmentStore for RecordingStore {
        async fn fetch(&self, _appointment_id: &str) -> AppResult<Option<AppointmentRecord>> {
            Ok(None)
        }

        async fn update_status(&self, appointment_id: &str, status: &str) -> AppResult<()> {
            self.updates
                .lock()
                .unwrap()
                .push((appointment_id.to_string(), status.to_string()));
            Ok(())
        }
    }

    fn session() -> CallSession {
        CallSession::new(
            "CA1".to_string(),
            "MZ1".to_string(),
            "apt-9".to_string(),
            "English".to_string(),
        )
    }

    #[test]
    fn test_parse_bare_json() {
        let decision =
            parse_decision(r#"{"intent": "confirm", "response_text": "See you then!"}"#).unwrap();
        assert_eq!(decision.intent, Intent::Confirm);
        assert_eq!(decision.response_text, "See you then!");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"intent\": \"reschedule\", \"response_text\": \"No problem.\"}\n```";
        let decision = parse_decision(raw).unwrap();
        assert_eq!(decision.intent, Intent::Reschedule);
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let raw = "Sure! Here is the decision you asked for:\n\
                   {\"intent\": \"clarify\", \"response_text\": \"Could you repeat that?\"}\n\
                   Let me know if you need anything else.";
        let decision = parse_decision(raw).unwrap();
        assert_eq!(decision.intent, Intent::Clarify);
    }

    #[test]
    fn test_parse_rejects_unknown_intent_and_empty_text() {
        assert!(parse_decision(r#"{"intent": "hangup", "response_text": "bye"}"#).is_err());
        assert!(parse_decision(r#"{"intent": "confirm", "response_text": "  "}"#).is_err());
        assert!(parse_decision("no json here at all").is_err());
    }

    /// A non-JSON reasoning response yields intent=clarify with non-empty
    /// response text and no raised error.
    #[tokio::test]
    async fn test_non_json_response_falls_back() {
        let store = Arc::new(RecordingStore::default());
        let policy = DialoguePolicy::new(
            Arc::new(CannedReasoning("I think they want to confirm?".to_string())),
            store.clone(),
        );

        let mut session = session();
        let decision = policy.decide("uh huh", &mut session).await;

        assert_eq!(decision.intent, Intent::Clarify);
        assert!(!decision.response_text.is_empty());
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reasoning_outage_falls_back() {
        let store = Arc::new(RecordingStore::default());
        let policy = DialoguePolicy::new(Arc::new(DownReasoning), store.clone());

        let mut session = session();
        let decision = policy.decide("hello?", &mut session).await;

        assert_eq!(decision, DialogueDecision::fallback());
        // Fallback turns still land in the history
        assert_eq!(session.history().len(), 2);
    }

    /// "yes I will be there" → confirm → exactly one update with status
    /// "confirmed" → history holds the patient and agent turns.
    #[tokio::test]
    async fn test_confirm_turn_updates_store_once() {
        let store = Arc::new(RecordingStore::default());
        let policy = DialoguePolicy::new(
            Arc::new(CannedReasoning(
                r#"{"intent": "confirm", "response_text": "Great, see you on Tuesday."}"#
                    .to_string(),
            )),
            store.clone(),
        );

        let mut session = session();
        let decision = policy.decide("yes I will be there", &mut session).await;

        assert_eq!(decision.intent, Intent::Confirm);

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], ("apt-9".to_string(), "confirmed".to_string()));

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "yes I will be there");
        assert_eq!(history[1].text, "Great, see you on Tuesday.");
    }

    /// A repeated confirm is a repeated write, not an error.
    #[tokio::test]
    async fn test_repeated_confirm_repeats_write() {
        let store = Arc::new(RecordingStore::default());
        let policy = DialoguePolicy::new(
            Arc::new(CannedReasoning(
                r#"{"intent": "confirm", "response_text": "Confirmed again."}"#.to_string(),
            )),
            store.clone(),
        );

        let mut session = session();
        policy.decide("yes", &mut session).await;
        policy.decide("yes, really", &mut session).await;

        assert_eq!(store.updates.lock().unwrap().len(), 2);
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn test_reschedule_writes_rescheduled() {
        let store = Arc::new(RecordingStore::default());
        let policy = DialoguePolicy::new(
            Arc::new(CannedReasoning(
                r#"{"intent": "reschedule", "response_text": "Let's find a new time."}"#
                    .to_string(),
            )),
            store.clone(),
        );

        let mut session = session();
        policy.decide("I can't make it", &mut session).await;

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, "rescheduled");
    }
}

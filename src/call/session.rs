//! # Call Session State
//!
//! The per-call session record: identifiers, the fetched appointment facts,
//! the append-only conversation history, and the static language profile
//! table. Exactly one `CallSession` exists per transport connection; the
//! controller creates it and hands it to the speech pipeline task, which is
//! the only writer for the rest of the call.

use crate::store::AppointmentRecord;
use serde::Serialize;

/// Recognition/synthesis settings for one supported language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub name: &'static str,
    pub recognition_locale: &'static str,
    pub synthesis_locale: &'static str,
    pub voice: &'static str,
}

/// Immutable language table. Lookup falls back to the first entry (English)
/// for any name not listed here, so an unexpected preferred language can
/// never leave a call without a voice.
pub static LANGUAGES: [LanguageProfile; 5] = [
    LanguageProfile {
        name: "English",
        recognition_locale: "en-US",
        synthesis_locale: "en-US",
        voice: "en-US-Wavenet-F",
    },
    LanguageProfile {
        name: "Hausa",
        recognition_locale: "ha-NG",
        synthesis_locale: "ha-NG",
        voice: "ha-NG-Wavenet-A",
    },
    LanguageProfile {
        name: "Igbo",
        recognition_locale: "ig-NG",
        synthesis_locale: "ig-NG",
        voice: "ig-NG-Wavenet-A",
    },
    LanguageProfile {
        name: "Yoruba",
        recognition_locale: "yo-NG",
        synthesis_locale: "yo-NG",
        voice: "yo-NG-Wavenet-A",
    },
    LanguageProfile {
        name: "Pidgin",
        recognition_locale: "en-NG",
        synthesis_locale: "en-NG",
        voice: "en-NG-Wavenet-B",
    },
];

/// Resolve a preferred-language name to its profile, falling back to English.
pub fn profile_for(name: &str) -> &'static LanguageProfile {
    LANGUAGES
        .iter()
        .find(|profile| profile.name == name)
        .unwrap_or(&LANGUAGES[0])
}

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Patient,
    Agent,
}

/// One utterance in the conversation history.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

/// Mutable per-call state.
pub struct CallSession {
    pub call_id: String,
    pub stream_id: String,
    pub appointment_id: String,
    pub language: String,
    pub appointment: Option<AppointmentRecord>,
    history: Vec<ConversationTurn>,
}

impl CallSession {
    pub fn new(
        call_id: String,
        stream_id: String,
        appointment_id: String,
        default_language: String,
    ) -> Self {
        Self {
            call_id,
            stream_id,
            appointment_id,
            language: default_language,
            appointment: None,
            history: Vec::new(),
        }
    }

    /// Attach the fetched appointment record, adopting its preferred language
    /// when one is present.
    pub fn apply_record(&mut self, record: AppointmentRecord) {
        if let Some(language) = record.preferred_language.clone() {
            self.language = language;
        }
        self.appointment = Some(record);
    }

    pub fn profile(&self) -> &'static LanguageProfile {
        profile_for(&self.language)
    }

    pub fn push_patient_turn(&mut self, text: &str) {
        self.history.push(ConversationTurn {
            role: TurnRole::Patient,
            text: text.to_string(),
        });
    }

    pub fn push_agent_turn(&mut self, text: &str) {
        self.history.push(ConversationTurn {
            role: TurnRole::Agent,
            text: text.to_string(),
        });
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Opening utterance: personalized when the appointment record was
    /// fetched, generic otherwise.
    pub fn greeting_text(&self) -> String {
        match self
            .appointment
            .as_ref()
            .and_then(|record| record.patient_name.as_deref())
        {
            Some(name) => format!(
                "Hello {}, this is an automated call from your clinic to confirm \
                 your upcoming appointment. Is this a good time to talk?",
                name
            ),
            None => "Hello, this is an automated call from your clinic about your \
                     upcoming appointment. Is this a good time to talk?"
                .to_string(),
        }
    }
}

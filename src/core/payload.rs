//! Message payloads the probe can publish.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::types::validation::validate_message_size;
use crate::types::Message;
use crate::Result;

/// Attribute key identifying who published a message.
pub const SOURCE_ATTRIBUTE: &str = "source";

/// Default value of the `source` attribute.
pub const DEFAULT_SOURCE: &str = "csharp-emulator-test";

/// Fixed demo record published with `--record`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientVisit {
    /// Patient full name.
    pub patient_name: String,
    /// National document number.
    pub document_number: String,
    /// ISO date of birth.
    pub birth_date: String,
    /// Visit identifier.
    pub visit_id: String,
    /// ISO date-time of the visit.
    pub visit_date: String,
    /// Department attending the visit.
    pub department: String,
    /// Attending physician.
    pub physician_name: String,
}

impl PatientVisit {
    /// The demo record.
    pub fn sample() -> Self {
        Self {
            patient_name: "Maria da Silva".to_string(),
            document_number: "123.456.789-00".to_string(),
            birth_date: "1985-04-12".to_string(),
            visit_id: "V-000123".to_string(),
            visit_date: "2024-01-15T09:30:00".to_string(),
            department: "Cardiology".to_string(),
            physician_name: "Dr. Joao Souza".to_string(),
        }
    }
}

/// What goes into the message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A literal string, sent as UTF-8.
    Text(String),
    /// The demo record, sent as JSON.
    Record(PatientVisit),
}

impl Payload {
    /// Default text: a start notice stamped with the local time.
    pub fn startup_notice(now: DateTime<Local>) -> Self {
        Payload::Text(format!(
            "Starting publish, current time {}",
            now.format("%Y-%m-%d %H:%M:%S")
        ))
    }

    /// Serialized body bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Text(text) => Ok(text.as_bytes().to_vec()),
            Payload::Record(record) => Ok(serde_json::to_vec(record)?),
        }
    }

    /// Build the outgoing message with the `source` attribute set.
    pub fn into_message(self, source: &str) -> Result<Message> {
        let data = self.to_bytes()?;
        validate_message_size(data.len())?;
        Ok(Message::new(data).with_attribute(SOURCE_ATTRIBUTE, source))
    }
}

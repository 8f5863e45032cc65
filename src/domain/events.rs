//! Events raised by an import session.
//!
//! Each event carries everything a read-side projection needs, so the
//! summary view can be rebuilt from the log alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{ImportPreview, ImportProgress, ImportResult, ParsedData, SourceFormat};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub source_format: SourceFormat,
    pub business_domain_id: Option<Uuid>,
    pub capability_ea_owner: Option<String>,
    pub preview: ImportPreview,
    pub parsed_data: ParsedData,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStarted {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdated {
    pub session_id: Uuid,
    pub progress: ImportProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportCompleted {
    pub session_id: Uuid,
    pub result: ImportResult,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFailed {
    pub session_id: Uuid,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportCancelled {
    pub session_id: Uuid,
    pub cancelled_at: DateTime<Utc>,
}

/// Closed set of session events
#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    Created(SessionCreated),
    Started(ImportStarted),
    ProgressUpdated(ProgressUpdated),
    Completed(ImportCompleted),
    Failed(ImportFailed),
    Cancelled(ImportCancelled),
}

impl ImportEvent {
    pub const CREATED: &'static str = "import_session_created";
    pub const STARTED: &'static str = "import_started";
    pub const PROGRESS_UPDATED: &'static str = "import_progress_updated";
    pub const COMPLETED: &'static str = "import_completed";
    pub const FAILED: &'static str = "import_failed";
    pub const CANCELLED: &'static str = "import_cancelled";

    /// Stable name written next to the payload in the store
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => Self::CREATED,
            Self::Started(_) => Self::STARTED,
            Self::ProgressUpdated(_) => Self::PROGRESS_UPDATED,
            Self::Completed(_) => Self::COMPLETED,
            Self::Failed(_) => Self::FAILED,
            Self::Cancelled(_) => Self::CANCELLED,
        }
    }

    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Created(e) => serde_json::to_value(e),
            Self::Started(e) => serde_json::to_value(e),
            Self::ProgressUpdated(e) => serde_json::to_value(e),
            Self::Completed(e) => serde_json::to_value(e),
            Self::Failed(e) => serde_json::to_value(e),
            Self::Cancelled(e) => serde_json::to_value(e),
        }
    }
}

/// Decoder for one stored event name
pub type EventDecoder = fn(serde_json::Value) -> Result<ImportEvent, serde_json::Error>;

fn decode_created(v: serde_json::Value) -> Result<ImportEvent, serde_json::Error> {
    serde_json::from_value(v).map(ImportEvent::Created)
}

fn decode_started(v: serde_json::Value) -> Result<ImportEvent, serde_json::Error> {
    serde_json::from_value(v).map(ImportEvent::Started)
}

fn decode_progress(v: serde_json::Value) -> Result<ImportEvent, serde_json::Error> {
    serde_json::from_value(v).map(ImportEvent::ProgressUpdated)
}

fn decode_completed(v: serde_json::Value) -> Result<ImportEvent, serde_json::Error> {
    serde_json::from_value(v).map(ImportEvent::Completed)
}

fn decode_failed(v: serde_json::Value) -> Result<ImportEvent, serde_json::Error> {
    serde_json::from_value(v).map(ImportEvent::Failed)
}

fn decode_cancelled(v: serde_json::Value) -> Result<ImportEvent, serde_json::Error> {
    serde_json::from_value(v).map(ImportEvent::Cancelled)
}

/// Explicit name-to-decoder table for session events
pub const DECODERS: &[(&str, EventDecoder)] = &[
    (ImportEvent::CREATED, decode_created),
    (ImportEvent::STARTED, decode_started),
    (ImportEvent::PROGRESS_UPDATED, decode_progress),
    (ImportEvent::COMPLETED, decode_completed),
    (ImportEvent::FAILED, decode_failed),
    (ImportEvent::CANCELLED, decode_cancelled),
];

/// Look up the decoder for an event name
pub fn decoder_for(name: &str) -> Option<EventDecoder> {
    DECODERS
        .iter()
        .find(|(event_name, _)| *event_name == name)
        .map(|(_, decoder)| *decoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_event_name_has_a_decoder() {
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let events = vec![
            ImportEvent::Started(ImportStarted { session_id, started_at: now }),
            ImportEvent::Failed(ImportFailed {
                session_id,
                reason: "import timed out".to_string(),
                failed_at: now,
            }),
            ImportEvent::Cancelled(ImportCancelled { session_id, cancelled_at: now }),
        ];

        for event in events {
            let payload = event.to_payload().unwrap();
            let decode = decoder_for(event.name()).unwrap();
            assert_eq!(decode(payload).unwrap(), event);
        }
    }

    #[test]
    fn test_unknown_event_name() {
        assert!(decoder_for("import_teleported").is_none());
    }
}

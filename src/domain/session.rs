//! The import session aggregate.
//!
//! A session is mutated only through its operations. Every operation
//! checks its guard, raises exactly one event, and folds that event into
//! the visible state with the same `apply` used when replaying the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::repository::Aggregate;

use super::events::{
    decoder_for, ImportCancelled, ImportCompleted, ImportEvent, ImportFailed, ImportStarted,
    ProgressUpdated, SessionCreated,
};
use super::model::{ImportPhase, ImportPreview, ImportProgress, ImportResult, ParsedData, SourceFormat};

/// Validation and transition errors raised by session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unsupported source format: {0}")]
    UnsupportedSourceFormat(String),

    #[error("invalid business domain id: {0}")]
    InvalidBusinessDomainId(String),

    #[error("unknown import phase: {0}")]
    UnknownPhase(String),

    #[error("invalid progress: completed {completed} exceeds total {total}")]
    InvalidProgress { total: usize, completed: usize },

    #[error("import already started")]
    AlreadyStarted,

    #[error("import not started")]
    NotStarted,

    #[error("cannot cancel started import")]
    CannotCancelStarted,
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    Importing,
    Completed,
    Failed,
    Cancelled,
}

impl ImportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Importing => "importing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for ImportStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// An import of one document, from preview to terminal outcome
#[derive(Debug, Clone, Serialize)]
pub struct ImportSession {
    pub id: Uuid,
    pub source_format: SourceFormat,
    pub business_domain_id: Option<Uuid>,
    pub capability_ea_owner: Option<String>,
    pub status: ImportStatus,
    pub preview: ImportPreview,
    pub progress: Option<ImportProgress>,
    pub parsed_data: ParsedData,
    pub result: Option<ImportResult>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of events folded from the store
    #[serde(skip)]
    version: u64,

    /// Raised but not yet saved
    #[serde(skip)]
    pending: Vec<ImportEvent>,
}

impl ImportSession {
    /// Create a pending session from a parsed document.
    pub fn create(
        source_format: &str,
        business_domain_id: Option<&str>,
        capability_ea_owner: Option<String>,
        preview: ImportPreview,
        parsed_data: ParsedData,
    ) -> Result<Self, SessionError> {
        let source_format: SourceFormat = source_format.parse()?;

        let business_domain_id = match business_domain_id.map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| SessionError::InvalidBusinessDomainId(raw.to_string()))?,
            ),
            _ => None,
        };

        let capability_ea_owner = capability_ea_owner
            .map(|owner| owner.trim().to_string())
            .filter(|owner| !owner.is_empty());

        let id = Uuid::new_v4();
        let mut session = Self::empty(id);
        session.raise(ImportEvent::Created(SessionCreated {
            session_id: id,
            source_format,
            business_domain_id,
            capability_ea_owner,
            preview,
            parsed_data,
            created_at: Utc::now(),
        }));

        Ok(session)
    }

    /// Pending -> Importing
    pub fn start_import(&mut self) -> Result<(), SessionError> {
        if self.status != ImportStatus::Pending {
            return Err(SessionError::AlreadyStarted);
        }

        self.raise(ImportEvent::Started(ImportStarted {
            session_id: self.id,
            started_at: Utc::now(),
        }));
        Ok(())
    }

    /// Replace the progress of a running import
    pub fn update_progress(
        &mut self,
        phase: ImportPhase,
        total: usize,
        completed: usize,
    ) -> Result<(), SessionError> {
        self.ensure_importing()?;
        let progress = ImportProgress::new(phase, total, completed)?;

        self.raise(ImportEvent::ProgressUpdated(ProgressUpdated {
            session_id: self.id,
            progress,
        }));
        Ok(())
    }

    /// Importing -> Completed
    pub fn complete(&mut self, result: ImportResult) -> Result<(), SessionError> {
        self.ensure_importing()?;

        self.raise(ImportEvent::Completed(ImportCompleted {
            session_id: self.id,
            result,
            completed_at: Utc::now(),
        }));
        Ok(())
    }

    /// Importing -> Failed
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_importing()?;

        self.raise(ImportEvent::Failed(ImportFailed {
            session_id: self.id,
            reason: reason.into(),
            failed_at: Utc::now(),
        }));
        Ok(())
    }

    /// Pending -> Cancelled
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.status != ImportStatus::Pending {
            return Err(SessionError::CannotCancelStarted);
        }

        self.raise(ImportEvent::Cancelled(ImportCancelled {
            session_id: self.id,
            cancelled_at: Utc::now(),
        }));
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ImportStatus::Cancelled
    }

    /// Events raised since the last save
    pub fn pending_events(&self) -> &[ImportEvent] {
        &self.pending
    }

    fn ensure_importing(&self) -> Result<(), SessionError> {
        if self.status != ImportStatus::Importing {
            return Err(SessionError::NotStarted);
        }
        Ok(())
    }

    fn raise(&mut self, event: ImportEvent) {
        self.apply(&event);
        self.pending.push(event);
    }

    /// Rebuild a session by folding events in order
    pub fn from_events<'a>(id: Uuid, events: impl IntoIterator<Item = &'a ImportEvent>) -> Self {
        let mut session = Self::empty(id);
        for event in events {
            session.apply(event);
            session.version += 1;
        }
        session
    }
}

impl Aggregate for ImportSession {
    type Event = ImportEvent;

    const AGGREGATE_TYPE: &'static str = "import_session";

    fn empty(id: Uuid) -> Self {
        Self {
            id,
            source_format: SourceFormat::ArchimateOpenExchange,
            business_domain_id: None,
            capability_ea_owner: None,
            status: ImportStatus::Pending,
            preview: ImportPreview::default(),
            progress: None,
            parsed_data: ParsedData::default(),
            result: None,
            failure_reason: None,
            created_at: DateTime::<Utc>::default(),
            started_at: None,
            completed_at: None,
            version: 0,
            pending: Vec::new(),
        }
    }

    fn apply(&mut self, event: &ImportEvent) {
        match event {
            ImportEvent::Created(e) => {
                self.id = e.session_id;
                self.source_format = e.source_format;
                self.business_domain_id = e.business_domain_id;
                self.capability_ea_owner = e.capability_ea_owner.clone();
                self.status = ImportStatus::Pending;
                self.preview = e.preview.clone();
                self.parsed_data = e.parsed_data.clone();
                self.created_at = e.created_at;
            }
            ImportEvent::Started(e) => {
                self.status = ImportStatus::Importing;
                self.started_at = Some(e.started_at);
            }
            ImportEvent::ProgressUpdated(e) => {
                self.progress = Some(e.progress);
            }
            ImportEvent::Completed(e) => {
                self.status = ImportStatus::Completed;
                self.result = Some(e.result.clone());
                self.completed_at = Some(e.completed_at);
            }
            ImportEvent::Failed(e) => {
                self.status = ImportStatus::Failed;
                self.failure_reason = Some(e.reason.clone());
                self.completed_at = Some(e.failed_at);
            }
            ImportEvent::Cancelled(e) => {
                self.status = ImportStatus::Cancelled;
                self.completed_at = Some(e.cancelled_at);
            }
        }
    }

    fn encode(event: &ImportEvent) -> Result<(&'static str, serde_json::Value), serde_json::Error> {
        Ok((event.name(), event.to_payload()?))
    }

    fn decode(
        event_type: &str,
        payload: serde_json::Value,
    ) -> Option<Result<ImportEvent, serde_json::Error>> {
        decoder_for(event_type).map(|decode| decode(payload))
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn mark_committed(&mut self, version: u64) {
        self.version = version;
        self.pending.clear();
    }

    fn pending(&self) -> Vec<ImportEvent> {
        self.pending.clone()
    }

    fn set_loaded_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ParsedElement;

    fn pending_session() -> ImportSession {
        let data = ParsedData {
            capabilities: vec![ParsedElement::new("cap-1", "Sales")],
            ..Default::default()
        };
        ImportSession::create(
            "archimate-openexchange",
            None,
            Some("EA Team".to_string()),
            ImportPreview::default(),
            data,
        )
        .unwrap()
    }

    #[test]
    fn test_create_starts_pending() {
        let session = pending_session();

        assert_eq!(session.status, ImportStatus::Pending);
        assert_eq!(session.capability_ea_owner.as_deref(), Some("EA Team"));
        assert_eq!(session.pending_events().len(), 1);
        assert_eq!(session.version(), 0);
    }

    #[test]
    fn test_create_rejects_unknown_format() {
        let result = ImportSession::create(
            "visio",
            None,
            None,
            ImportPreview::default(),
            ParsedData::default(),
        );
        assert_eq!(
            result.unwrap_err(),
            SessionError::UnsupportedSourceFormat("visio".to_string())
        );
    }

    #[test]
    fn test_create_rejects_malformed_domain_id() {
        let result = ImportSession::create(
            "archimate-openexchange",
            Some("not-a-uuid"),
            None,
            ImportPreview::default(),
            ParsedData::default(),
        );
        assert!(matches!(result, Err(SessionError::InvalidBusinessDomainId(_))));
    }

    #[test]
    fn test_blank_owner_is_dropped() {
        let session = ImportSession::create(
            "archimate-openexchange",
            Some(""),
            Some("   ".to_string()),
            ImportPreview::default(),
            ParsedData::default(),
        )
        .unwrap();

        assert!(session.capability_ea_owner.is_none());
        assert!(session.business_domain_id.is_none());
    }

    #[test]
    fn test_start_twice() {
        let mut session = pending_session();
        session.start_import().unwrap();

        assert_eq!(session.start_import(), Err(SessionError::AlreadyStarted));
        assert_eq!(session.status, ImportStatus::Importing);
    }

    #[test]
    fn test_cancel_after_start() {
        let mut session = pending_session();
        session.start_import().unwrap();

        assert_eq!(session.cancel(), Err(SessionError::CannotCancelStarted));
    }

    #[test]
    fn test_operations_before_start() {
        let mut session = pending_session();

        assert_eq!(
            session.update_progress(ImportPhase::CreatingComponents, 1, 0),
            Err(SessionError::NotStarted)
        );
        assert_eq!(
            session.complete(ImportResult::default()),
            Err(SessionError::NotStarted)
        );
        assert_eq!(session.fail("boom"), Err(SessionError::NotStarted));
        assert_eq!(session.pending_events().len(), 1);
    }

    #[test]
    fn test_cancel_pending() {
        let mut session = pending_session();
        session.cancel().unwrap();

        assert!(session.is_cancelled());
        assert!(session.result.is_none());
        assert_eq!(session.start_import(), Err(SessionError::AlreadyStarted));
    }

    #[test]
    fn test_result_only_in_terminal_state() {
        let mut session = pending_session();
        session.start_import().unwrap();
        session
            .update_progress(ImportPhase::CreatingCapabilities, 1, 1)
            .unwrap();
        assert!(session.result.is_none());

        session
            .complete(ImportResult {
                capabilities_created: 1,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(session.status, ImportStatus::Completed);
        assert_eq!(session.result.as_ref().unwrap().capabilities_created, 1);
        assert!(session.completed_at.is_some());
        assert_eq!(session.fail("late"), Err(SessionError::NotStarted));
    }

    #[test]
    fn test_replay_matches_live_state() {
        let mut live = pending_session();
        live.start_import().unwrap();
        live.update_progress(ImportPhase::CreatingComponents, 4, 4)
            .unwrap();
        live.fail("import timed out after 1s").unwrap();

        let replayed = ImportSession::from_events(live.id, live.pending_events());

        assert_eq!(replayed.status, ImportStatus::Failed);
        assert_eq!(replayed.progress, live.progress);
        assert_eq!(replayed.parsed_data, live.parsed_data);
        assert_eq!(replayed.failure_reason, live.failure_reason);
        assert_eq!(replayed.version(), 4);
    }
}

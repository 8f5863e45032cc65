//! Read-side summary of an import session.
//!
//! Built from stored envelopes alone; it never loads the session aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::event_store::StoredEvent;

use super::events::ImportEvent;
use super::model::{ImportPreview, ImportProgress, ImportResult};
use super::session::ImportStatus;

/// What a status endpoint or `status` command shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub session_id: Uuid,
    pub status: ImportStatus,
    pub source_format: String,
    pub preview: ImportPreview,
    pub progress: Option<ImportProgress>,
    pub result: Option<ImportResult>,
    pub failure_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Stream version this summary reflects
    pub version: u64,
}

#[derive(Deserialize)]
struct CreatedView {
    source_format: String,
    preview: ImportPreview,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ProgressView {
    progress: ImportProgress,
}

#[derive(Deserialize)]
struct CompletedView {
    result: ImportResult,
    completed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct FailedView {
    reason: String,
    failed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CancelledView {
    cancelled_at: DateTime<Utc>,
}

impl ImportSummary {
    fn empty(session_id: Uuid) -> Self {
        Self {
            session_id,
            status: ImportStatus::Pending,
            source_format: String::new(),
            preview: ImportPreview::default(),
            progress: None,
            result: None,
            failure_reason: None,
            created_at: None,
            completed_at: None,
            version: 0,
        }
    }

    /// Fold envelopes into a summary; `None` for an empty stream
    pub fn project(events: &[StoredEvent]) -> Result<Option<Self>, serde_json::Error> {
        let Some(first) = events.first() else {
            return Ok(None);
        };

        let mut summary = Self::empty(first.stream_id);
        for event in events {
            summary.apply(event)?;
        }
        Ok(Some(summary))
    }

    /// Apply one envelope. Unknown event types only advance the version.
    pub fn apply(&mut self, event: &StoredEvent) -> Result<(), serde_json::Error> {
        match event.event_type.as_str() {
            ImportEvent::CREATED => {
                let view: CreatedView = serde_json::from_value(event.data.clone())?;
                self.status = ImportStatus::Pending;
                self.source_format = view.source_format;
                self.preview = view.preview;
                self.created_at = Some(view.created_at);
            }
            ImportEvent::STARTED => self.status = ImportStatus::Importing,
            ImportEvent::PROGRESS_UPDATED => {
                let view: ProgressView = serde_json::from_value(event.data.clone())?;
                self.progress = Some(view.progress);
            }
            ImportEvent::COMPLETED => {
                let view: CompletedView = serde_json::from_value(event.data.clone())?;
                self.status = ImportStatus::Completed;
                self.result = Some(view.result);
                self.completed_at = Some(view.completed_at);
            }
            ImportEvent::FAILED => {
                let view: FailedView = serde_json::from_value(event.data.clone())?;
                self.status = ImportStatus::Failed;
                self.failure_reason = Some(view.reason);
                self.completed_at = Some(view.failed_at);
            }
            ImportEvent::CANCELLED => {
                let view: CancelledView = serde_json::from_value(event.data.clone())?;
                self.status = ImportStatus::Cancelled;
                self.completed_at = Some(view.cancelled_at);
            }
            other => tracing::debug!(event_type = other, "Ignoring unknown event in summary"),
        }

        self.version = event.version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::event_store::{EventStore, InMemoryEventStore};
    use crate::core::repository::Repository;
    use crate::domain::{ImportPhase, ImportSession, ParsedData};

    #[tokio::test]
    async fn test_summary_matches_session_state() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let repo: Repository<ImportSession> = Repository::new(Arc::clone(&store));

        let mut session = ImportSession::create(
            "archimate-openexchange",
            None,
            None,
            ImportPreview::default(),
            ParsedData::default(),
        )
        .unwrap();
        session.start_import().unwrap();
        session
            .update_progress(ImportPhase::CreatingValueStreams, 2, 1)
            .unwrap();
        session
            .complete(ImportResult {
                value_streams_created: 1,
                ..Default::default()
            })
            .unwrap();
        repo.save(&mut session).await.unwrap();

        let events = store.load(session.id).await.unwrap();
        let summary = ImportSummary::project(&events).unwrap().unwrap();

        assert_eq!(summary.session_id, session.id);
        assert_eq!(summary.status, session.status);
        assert_eq!(summary.progress, session.progress);
        assert_eq!(summary.result, session.result);
        assert_eq!(summary.preview, session.preview);
        assert_eq!(summary.source_format, "archimate-openexchange");
        assert_eq!(summary.completed_at, session.completed_at);
        assert_eq!(summary.version, 4);
    }

    #[test]
    fn test_empty_stream() {
        assert!(ImportSummary::project(&[]).unwrap().is_none());
    }
}

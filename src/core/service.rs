//! Synchronous command and query handling for import sessions.
//!
//! Create, confirm and cancel each load, mutate and save a session and
//! return. Only confirm starts background work, by handing the session ID
//! to the runner once the session is saved as `Importing`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use super::event_store::{EventStore, StoreError};
use super::repository::Repository;
use super::runner::{ImportRunner, RequestContext};
use crate::domain::{ImportSession, ImportSummary, SessionError, SourceFormat};
use crate::parser::{parse_document, ParseError, ParseResult};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("import session not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to project session {session_id}: {source}")]
    Projection {
        session_id: Uuid,
        source: serde_json::Error,
    },
}

/// Input for creating a session
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub source_format: String,
    pub business_domain_id: Option<String>,
    pub capability_ea_owner: Option<String>,
    pub content: Vec<u8>,
}

/// Entry point for callers (CLI or an HTTP layer)
#[derive(Clone)]
pub struct ImportService {
    sessions: Repository<ImportSession>,
    runner: ImportRunner,
    max_document_bytes: usize,
}

impl ImportService {
    pub fn new(
        sessions: Repository<ImportSession>,
        runner: ImportRunner,
        max_document_bytes: usize,
    ) -> Self {
        Self {
            sessions,
            runner,
            max_document_bytes,
        }
    }

    pub fn runner(&self) -> &ImportRunner {
        &self.runner
    }

    fn store(&self) -> &Arc<dyn EventStore> {
        self.sessions.store()
    }

    /// Parse and classify a document without creating anything
    pub fn preview_document(&self, content: &[u8]) -> Result<ParseResult, ServiceError> {
        Ok(parse_document(content, self.max_document_bytes)?)
    }

    /// Parse a document and save a new `Pending` session for it
    #[instrument(skip(self, request), fields(format = %request.source_format, bytes = request.content.len()))]
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ImportSession, ServiceError> {
        // Format is validated before the document is read
        request.source_format.parse::<SourceFormat>()?;

        let parsed = parse_document(&request.content, self.max_document_bytes)?;

        let mut session = ImportSession::create(
            &request.source_format,
            request.business_domain_id.as_deref(),
            request.capability_ea_owner,
            parsed.preview,
            parsed.parsed_data,
        )?;
        self.sessions.save(&mut session).await?;

        info!(session_id = %session.id, "Import session created");
        Ok(session)
    }

    /// Move a session to `Importing` and hand it to the runner.
    ///
    /// Returns once the transition is saved; the import itself runs in
    /// the background.
    #[instrument(skip(self, context))]
    pub async fn confirm(
        &self,
        session_id: Uuid,
        context: RequestContext,
    ) -> Result<ImportSession, ServiceError> {
        let mut session = self.load(session_id).await?;
        session.start_import()?;
        self.sessions.save(&mut session).await?;

        info!("Import confirmed, starting background run");
        self.runner.spawn(session_id, context);
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, session_id: Uuid) -> Result<ImportSession, ServiceError> {
        let mut session = self.load(session_id).await?;
        session.cancel()?;
        self.sessions.save(&mut session).await?;

        info!("Import session cancelled");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<ImportSession, ServiceError> {
        self.load(session_id).await
    }

    /// Summary built from the stored events, without loading the aggregate
    pub async fn get_summary(&self, session_id: Uuid) -> Result<ImportSummary, ServiceError> {
        let events = self.store().load(session_id).await?;
        ImportSummary::project(&events)
            .map_err(|source| ServiceError::Projection { session_id, source })?
            .ok_or(ServiceError::NotFound(session_id))
    }

    /// Summaries of every session, newest first
    pub async fn list_sessions(&self) -> Result<Vec<ImportSummary>, ServiceError> {
        let mut summaries = Vec::new();
        for session_id in self.store().list_streams().await? {
            let events = self.store().load(session_id).await?;
            let summary = ImportSummary::project(&events)
                .map_err(|source| ServiceError::Projection { session_id, source })?;
            summaries.extend(summary);
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn load(&self, session_id: Uuid) -> Result<ImportSession, ServiceError> {
        self.sessions
            .load(session_id)
            .await?
            .ok_or(ServiceError::NotFound(session_id))
    }
}

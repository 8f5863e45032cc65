//! Background execution of confirmed imports.
//!
//! A confirmed session is handed to the runner by ID. The run lives on a
//! task owned by the runner's tracker, not by the request that confirmed
//! it, and its cancellation token is a child of the process-wide shutdown
//! token. Every way a run can end moves the session out of `Importing`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::repository::Repository;
use super::saga::{ImportContext, ImportSaga, ProgressReporter, SagaError};
use crate::domain::{ImportPhase, ImportResult, ImportSession, ImportStatus, SessionError};

use super::event_store::StoreError;

/// Attempts made to persist a terminal or progress event before giving up
const SAVE_ATTEMPTS: usize = 5;

/// Who asked for a run; carried into the background task's logs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Option<String>,
    pub tenant: Option<String>,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            tenant: Some(tenant.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a background run ended
#[derive(Debug)]
enum RunOutcome {
    Finished(ImportResult),
    Failed(String),
}

/// Supervises background import runs
#[derive(Clone)]
pub struct ImportRunner {
    sessions: Repository<ImportSession>,
    saga: ImportSaga,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    budget: Duration,
}

impl ImportRunner {
    pub fn new(
        sessions: Repository<ImportSession>,
        saga: ImportSaga,
        shutdown: CancellationToken,
        budget: Duration,
    ) -> Self {
        Self {
            sessions,
            saga,
            shutdown,
            tracker: TaskTracker::new(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// The process-scope token runs derive their cancellation from
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Start a background run for an `Importing` session.
    ///
    /// Returns as soon as the task is spawned.
    pub fn spawn(&self, session_id: Uuid, context: RequestContext) {
        let runner = self.clone();
        let span = tracing::info_span!(
            "import_run",
            %session_id,
            actor = context.actor.as_deref().unwrap_or("-"),
            tenant = context.tenant.as_deref().unwrap_or("-"),
        );

        self.tracker
            .spawn(async move { runner.run(session_id).await }.instrument(span));
    }

    /// Signal every in-flight run to stop
    pub fn shutdown(&self) {
        info!("Shutting down import runner");
        self.shutdown.cancel();
    }

    /// Wait until every spawned run has reached a terminal state
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    async fn run(&self, session_id: Uuid) {
        let outcome = self.supervise(session_id).await;

        let persisted = match outcome {
            RunOutcome::Finished(result) => {
                info!(
                    errors = result.errors.len(),
                    "Import finished, recording result"
                );
                self.finish(session_id, |session| session.complete(result.clone()))
                    .await
            }
            RunOutcome::Failed(reason) => {
                error!(%reason, "Import failed");
                self.finish(session_id, |session| session.fail(reason.clone()))
                    .await
            }
        };

        if let Err(e) = persisted {
            error!(error = %e, "Could not record the end of the import");
        }
    }

    /// Run the saga on an inner task and race it against the budget and shutdown.
    async fn supervise(&self, session_id: Uuid) -> RunOutcome {
        let session = match self.sessions.load(session_id).await {
            Ok(Some(session)) if session.status == ImportStatus::Importing => session,
            Ok(Some(session)) => {
                return RunOutcome::Failed(format!(
                    "session is {}, expected importing",
                    session.status.as_str()
                ))
            }
            Ok(None) => return RunOutcome::Failed("session not found".to_string()),
            Err(e) => return RunOutcome::Failed(format!("failed to load session: {}", e)),
        };

        let cancel = self.shutdown.child_token();
        let saga = self.saga.clone();
        let recorder = ProgressRecorder {
            sessions: self.sessions.clone(),
            session_id,
        };
        let context = ImportContext {
            business_domain_id: session.business_domain_id,
            capability_ea_owner: session.capability_ea_owner.clone(),
        };
        let data = session.parsed_data;
        let run_cancel = cancel.clone();

        let mut handle = tokio::spawn(
            async move { saga.execute(&data, &context, &recorder, &run_cancel).await }
                .in_current_span(),
        );

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(result)) => RunOutcome::Finished(result),
                Ok(Err(SagaError::Cancelled)) => {
                    RunOutcome::Failed("import cancelled before completion".to_string())
                }
                Err(e) if e.is_panic() => {
                    RunOutcome::Failed(format!("import aborted by internal panic: {}", panic_message(e)))
                }
                Err(e) => RunOutcome::Failed(format!("import task cancelled: {}", e)),
            },
            _ = tokio::time::sleep(self.budget) => {
                warn!(budget_secs = self.budget.as_secs_f64(), "Import exceeded its budget");
                cancel.cancel();
                handle.abort();
                RunOutcome::Failed(format!(
                    "import timed out after {:.1}s",
                    self.budget.as_secs_f64()
                ))
            }
            _ = self.shutdown.cancelled() => {
                warn!("Shutdown requested during import");
                cancel.cancel();
                handle.abort();
                RunOutcome::Failed("import cancelled by shutdown".to_string())
            }
        }
    }

    /// Reload, apply a terminal transition and save, retrying on conflict.
    ///
    /// A session that is already terminal is left alone.
    async fn finish<F>(&self, session_id: Uuid, transition: F) -> Result<(), RunnerError>
    where
        F: Fn(&mut ImportSession) -> Result<(), SessionError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut session = self
                .sessions
                .load(session_id)
                .await?
                .ok_or(RunnerError::SessionNotFound(session_id))?;

            if session.status.is_terminal() {
                warn!(status = session.status.as_str(), "Session already terminal");
                return Ok(());
            }

            transition(&mut session)?;

            match self.sessions.save(&mut session).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < SAVE_ATTEMPTS => {
                    warn!(attempt, "Concurrent write while finishing import, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Persists saga progress onto the session stream
struct ProgressRecorder {
    sessions: Repository<ImportSession>,
    session_id: Uuid,
}

impl ProgressRecorder {
    async fn record(
        &self,
        phase: ImportPhase,
        total: usize,
        completed: usize,
    ) -> Result<(), RunnerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut session = self
                .sessions
                .load(self.session_id)
                .await?
                .ok_or(RunnerError::SessionNotFound(self.session_id))?;
            session.update_progress(phase, total, completed)?;

            match self.sessions.save(&mut session).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < SAVE_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl ProgressReporter for ProgressRecorder {
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    async fn report(&self, phase: ImportPhase, total: usize, completed: usize) {
        if let Err(e) = self.record(phase, total, completed).await {
            warn!(error = %e, "Failed to record progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_message_extracts_str_payload() {
        let handle = tokio::spawn(async {
            panic!("gateway exploded");
        });
        let error = handle.await.unwrap_err();

        assert!(error.is_panic());
        assert_eq!(panic_message(error), "gateway exploded");
    }

    #[tokio::test]
    async fn test_panic_message_extracts_formatted_payload() {
        let handle = tokio::spawn(async {
            let code = 7;
            panic!("gateway exploded with {}", code);
        });
        let error = handle.await.unwrap_err();

        assert_eq!(panic_message(error), "gateway exploded with 7");
    }

    #[test]
    fn test_request_context_new() {
        let context = RequestContext::new("alice", "acme");
        assert_eq!(context.actor.as_deref(), Some("alice"));
        assert_eq!(context.tenant.as_deref(), Some("acme"));
    }
}

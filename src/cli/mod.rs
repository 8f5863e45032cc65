//! Command-line interface for ea-import.
//!
//! Provides commands for previewing documents, creating and confirming
//! import sessions, and inspecting their state. Created objects go to the
//! ledger gateway under the configured home directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::LedgerGateway;
use crate::config;
use crate::core::{
    CreateSessionRequest, EventStore, ImportRunner, ImportSaga, ImportService, JsonlEventStore,
    Repository, RequestContext,
};
use crate::domain::{ImportPreview, ImportSummary, SourceFormat};

/// ea-import - Import architecture models into a capability map
#[derive(Parser, Debug)]
#[command(name = "ea-import")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Actor recorded with confirmed imports
    #[arg(long, global = true, env = "EA_IMPORT_ACTOR")]
    pub actor: Option<String>,

    /// Tenant recorded with confirmed imports
    #[arg(long, global = true, env = "EA_IMPORT_TENANT")]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show what a document would import, without creating a session
    Preview {
        /// Exchange document to read
        file: PathBuf,
    },

    /// Create a pending import session from a document
    Create {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Start a pending import and wait for it to finish
    Confirm {
        /// Session ID (UUID)
        session_id: String,
    },

    /// Create a session and confirm it immediately
    Import {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show the state of a session
    Status {
        /// Session ID (UUID)
        session_id: String,

        /// List every item error
        #[arg(short, long)]
        errors: bool,
    },

    /// Cancel a pending session
    Cancel {
        /// Session ID (UUID)
        session_id: String,
    },

    /// List import sessions
    Sessions {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(clap::Args, Debug)]
pub struct SourceArgs {
    /// Exchange document to read
    pub file: PathBuf,

    /// Document format
    #[arg(short, long, default_value = "archimate-openexchange")]
    pub format: String,

    /// Business domain (UUID) to assign root capabilities to
    #[arg(long)]
    pub business_domain: Option<String>,

    /// EA owner recorded on every imported capability
    #[arg(long)]
    pub ea_owner: Option<String>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let context = RequestContext {
            actor: self.actor,
            tenant: self.tenant,
        };

        match self.command {
            Commands::Preview { file } => preview(&file).await,
            Commands::Create { source } => {
                let service = build_service().await?;
                let session_id = create_session(&service, source).await?;
                println!("{}", session_id);
                Ok(())
            }
            Commands::Confirm { session_id } => {
                let service = build_service().await?;
                confirm(&service, parse_session_id(&session_id)?, context).await
            }
            Commands::Import { source } => {
                let service = build_service().await?;
                let session_id = create_session(&service, source).await?;
                confirm(&service, session_id, context).await
            }
            Commands::Status { session_id, errors } => {
                let service = build_service().await?;
                let summary = service.get_summary(parse_session_id(&session_id)?).await?;
                print_summary(&summary, errors);
                Ok(())
            }
            Commands::Cancel { session_id } => {
                let service = build_service().await?;
                let session = service.cancel(parse_session_id(&session_id)?).await?;
                eprintln!("[Session {} cancelled]", session.id);
                Ok(())
            }
            Commands::Sessions { limit } => list_sessions(limit).await,
            Commands::Config => show_config(),
        }
    }
}

/// Wire the JSONL store, ledger gateway and runner from configuration
async fn build_service() -> Result<ImportService> {
    let cfg = config::config()?;

    let store: Arc<dyn EventStore> = Arc::new(
        JsonlEventStore::open(cfg.sessions_dir())
            .await
            .context("Failed to open session store")?,
    );
    let ledger = Arc::new(
        LedgerGateway::open(cfg.ledger_path())
            .await
            .context("Failed to open ledger")?,
    );

    let sessions = Repository::new(store);
    let saga = ImportSaga::new(ledger.clone(), ledger.clone(), ledger);
    let runner = ImportRunner::new(
        sessions.clone(),
        saga,
        CancellationToken::new(),
        cfg.limits.execution_timeout(),
    );

    Ok(ImportService::new(
        sessions,
        runner,
        cfg.limits.max_document_bytes,
    ))
}

fn parse_session_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid session ID: {}", raw))
}

async fn read_document(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read document: {}", path.display()))
}

async fn preview(file: &Path) -> Result<()> {
    let cfg = config::config()?;
    let content = read_document(file).await?;

    let parsed = crate::parser::parse_document(&content, cfg.limits.max_document_bytes)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    print_preview(&parsed.preview);
    Ok(())
}

async fn create_session(service: &ImportService, source: SourceArgs) -> Result<Uuid> {
    // Reject an unknown format before reading the file
    source.format.parse::<SourceFormat>()?;

    let content = read_document(&source.file).await?;
    let session = service
        .create_session(CreateSessionRequest {
            source_format: source.format,
            business_domain_id: source.business_domain,
            capability_ea_owner: source.ea_owner,
            content,
        })
        .await
        .with_context(|| format!("Failed to create session from {}", source.file.display()))?;

    eprintln!("[Session {} created]", session.id);
    print_preview(&session.preview);
    Ok(session.id)
}

/// Confirm, then keep the process alive until the run is terminal.
///
/// Ctrl-C cancels the runner's shutdown token.
async fn confirm(service: &ImportService, session_id: Uuid, context: RequestContext) -> Result<()> {
    service.confirm(session_id, context).await?;
    eprintln!("[Import {} started]", session_id);

    let runner = service.runner();
    tokio::select! {
        _ = runner.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n[Interrupted, cancelling import]");
            runner.shutdown();
            runner.wait().await;
        }
    }

    let summary = service.get_summary(session_id).await?;
    print_summary(&summary, false);
    Ok(())
}

async fn list_sessions(limit: usize) -> Result<()> {
    let service = build_service().await?;
    let sessions = service.list_sessions().await?;

    if sessions.is_empty() {
        println!("No import sessions found");
        return Ok(());
    }

    println!("{:<38} {:<11} {:<26} {:<8}", "SESSION ID", "STATUS", "CREATED", "ERRORS");
    println!("{}", "-".repeat(85));

    for summary in sessions.into_iter().take(limit) {
        let created = summary
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let errors = summary
            .result
            .as_ref()
            .map(|r| r.errors.len().to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<38} {:<11} {:<26} {:<8}",
            summary.session_id,
            summary.status.as_str(),
            created,
            errors
        );
    }

    Ok(())
}

fn print_preview(preview: &ImportPreview) {
    let supported = &preview.supported;
    println!("Supported:");
    println!("  Capabilities:              {}", supported.capabilities);
    println!("  Components:                {}", supported.components);
    println!("  Value streams:             {}", supported.value_streams);
    println!("  Parent/child links:        {}", supported.parent_child_relationships);
    println!("  Realizations:              {}", supported.realizations);
    println!("  Component relations:       {}", supported.component_relationships);
    println!(
        "  Capability->stage mappings: {}",
        supported.capability_to_value_stream_mappings
    );

    let unsupported = &preview.unsupported;
    if !unsupported.elements.is_empty() || !unsupported.relationships.is_empty() {
        println!("\nUnsupported (will be ignored):");
        for (type_name, count) in &unsupported.elements {
            println!("  element {}: {}", type_name, count);
        }
        for (type_name, count) in &unsupported.relationships {
            println!("  relationship {}: {}", type_name, count);
        }
    }
}

fn print_summary(summary: &ImportSummary, show_errors: bool) {
    println!("Session ID: {}", summary.session_id);
    println!("Format: {}", summary.source_format);
    println!("Status: {}", summary.status.as_str());
    if let Some(created) = summary.created_at {
        println!("Created: {}", created);
    }
    if let Some(completed) = summary.completed_at {
        println!("Finished: {}", completed);
    }
    if let Some(progress) = &summary.progress {
        println!(
            "Progress: {} ({}/{})",
            progress.phase(),
            progress.completed_items(),
            progress.total_items()
        );
    }
    if let Some(reason) = &summary.failure_reason {
        println!("Failure: {}", reason);
    }

    let Some(result) = &summary.result else {
        return;
    };

    println!("\nCreated:");
    println!("  Components:           {}", result.components_created);
    println!("  Capabilities:         {}", result.capabilities_created);
    println!("  Capability metadata:  {}", result.capability_metadata_updated);
    println!("  Value streams:        {}", result.value_streams_created);
    println!("  Realizations:         {}", result.realizations_created);
    println!("  Component relations:  {}", result.component_relations_created);
    println!("  Domain assignments:   {}", result.domain_assignments);
    println!("  Stage mappings:       {}", result.capability_mappings);
    println!(
        "\nErrors: {} skipped, {} warnings",
        result.skipped_count(),
        result.warning_count()
    );

    if show_errors {
        for error in &result.errors {
            println!(
                "  [{:?}] {} ({}): {}",
                error.action, error.source_name, error.source_element, error.message
            );
        }
    }
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("ea-import configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Sessions: {}", cfg.sessions_dir().display());
    println!("  Ledger:   {}", cfg.ledger_path().display());
    println!();
    println!("Limits:");
    println!("  Max document size:  {} bytes", cfg.limits.max_document_bytes);
    println!("  Execution timeout:  {}s", cfg.limits.execution_timeout_seconds);

    Ok(())
}

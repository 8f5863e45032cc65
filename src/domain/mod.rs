//! Domain types for the importer.
//!
//! This module contains:
//! - Model: parsed document content, preview, progress and results
//! - Events: the closed set of import session events
//! - Session: the event-sourced import session state machine
//! - Summary: the read-side projection of a session

pub mod events;
pub mod model;
pub mod session;
pub mod summary;

// Re-export commonly used types
pub use events::ImportEvent;
pub use model::{
    compose_notes, ErrorAction, ImportError, ImportPhase, ImportPreview, ImportProgress,
    ImportResult, ParsedData, ParsedElement, ParsedRelationship, RelationshipKind, SourceFormat,
    SupportedCounts, UnsupportedCounts, MAX_CAPABILITY_LEVEL,
};
pub use session::{ImportSession, ImportStatus, SessionError};
pub use summary::ImportSummary;

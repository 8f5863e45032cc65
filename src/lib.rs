//! ea-import - Event-sourced import of architecture models
//!
//! Reads an ArchiMate Open Exchange document, classifies what it can
//! import, and creates components, capabilities and value streams
//! through gateways in eight best-effort phases.
//!
//! # Architecture
//!
//! The system is built around event sourcing:
//! - Every import session change is recorded as an immutable event
//! - Session state is derived by replaying its events
//! - Confirmed imports run in the background under a time budget and a
//!   process-wide shutdown token
//!
//! # Modules
//!
//! - `parser`: Document reading and classification
//! - `domain`: Session aggregate, events and import data
//! - `core`: Event store, repository, saga, runner and service
//! - `adapters`: Gateway traits and the file-backed ledger gateway
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # See what a document contains
//! ea-import preview model.xml
//!
//! # Import it, assigning roots to a business domain
//! ea-import import model.xml --business-domain <uuid> --ea-owner "Jane Doe"
//!
//! # Check a session
//! ea-import status <session-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod parser;

// Re-export main types at crate root for convenience
pub use crate::core::{ImportRunner, ImportSaga, ImportService};
pub use domain::{ImportEvent, ImportResult, ImportSession, ImportStatus, ImportSummary};
pub use parser::{parse_document, ParseError, ParseResult};

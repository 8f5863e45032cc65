//! Core import machinery.
//!
//! This module contains:
//! - EventStore: Append-only, version-checked event streams
//! - Repository: Load/save of event-sourced aggregates
//! - Saga: The eight-phase import orchestration
//! - Runner: Background execution with budget and shutdown handling
//! - Service: Command and query entry points

pub mod event_store;
pub mod repository;
pub mod runner;
pub mod saga;
pub mod service;

// Re-export commonly used types
pub use event_store::{EventStore, InMemoryEventStore, JsonlEventStore, StoreError, StoredEvent};
pub use repository::{Aggregate, Repository};
pub use runner::{ImportRunner, RequestContext, RunnerError};
pub use saga::{ImportContext, ImportSaga, NoProgress, ProgressReporter, SagaError};
pub use service::{CreateSessionRequest, ImportService, ServiceError};

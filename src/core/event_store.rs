//! Append-only event streams with optimistic concurrency.
//!
//! Each stream is keyed by an aggregate ID. Appends carry the version the
//! writer last observed and are rejected when the stream has moved on.
//! The file store keeps one newline-delimited JSON (JSONL) log per stream
//! for easy inspection, and locks the stream on disk while appending.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// A persisted event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// The stream (aggregate) this event belongs to
    pub stream_id: Uuid,

    pub aggregate_type: String,

    /// 1-based position in the stream
    pub version: u64,

    /// Name used to pick a decoder on load
    pub event_type: String,

    /// When this event was appended (ISO 8601)
    pub timestamp: DateTime<Utc>,

    pub data: serde_json::Value,
}

/// An event ready to be appended
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub data: serde_json::Value,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Errors raised by event stores and repositories
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("concurrency conflict on stream {stream_id}: expected version {expected}, found {actual}")]
    Conflict {
        stream_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("unknown event type '{event_type}' in stream {stream_id}")]
    UnknownEventType { stream_id: Uuid, event_type: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// All events of a stream, in append order
    async fn load(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, StoreError>;

    /// Append events if the stream is still at `expected_version`.
    ///
    /// Returns the new stream version.
    async fn append(
        &self,
        stream_id: Uuid,
        aggregate_type: &str,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64, StoreError>;

    /// IDs of every stream in the store
    async fn list_streams(&self) -> Result<Vec<Uuid>, StoreError>;
}

fn envelope(
    stream_id: Uuid,
    aggregate_type: &str,
    version: u64,
    event: NewEvent,
) -> StoredEvent {
    StoredEvent {
        id: Uuid::new_v4(),
        stream_id,
        aggregate_type: aggregate_type.to_string(),
        version,
        event_type: event.event_type,
        timestamp: Utc::now(),
        data: event.data,
    }
}

/// Event store held in process memory
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn load(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        let streams = self.streams.lock().await;
        Ok(streams.get(&stream_id).cloned().unwrap_or_default())
    }

    async fn append(
        &self,
        stream_id: Uuid,
        aggregate_type: &str,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64, StoreError> {
        let mut streams = self.streams.lock().await;
        let stream = streams.entry(stream_id).or_default();

        let actual = stream.len() as u64;
        if actual != expected_version {
            return Err(StoreError::Conflict {
                stream_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let version = stream.len() as u64 + 1;
            stream.push(envelope(stream_id, aggregate_type, version, event));
        }

        Ok(stream.len() as u64)
    }

    async fn list_streams(&self) -> Result<Vec<Uuid>, StoreError> {
        let streams = self.streams.lock().await;
        Ok(streams.keys().copied().collect())
    }
}

const EVENTS_FILE: &str = "events.jsonl";
const LOCK_FILE: &str = "events.lock";

/// File-based event store using one JSONL log per stream.
///
/// Appends hold an exclusive lock on the stream's `events.lock` file while
/// they count, compare and write, so separate handles and processes
/// sharing a directory still see one winner per expected version.
pub struct JsonlEventStore {
    /// Directory holding one subdirectory per stream
    base_dir: PathBuf,

    /// Keeps this handle's appends off the blocking pool one at a time
    write_lock: Mutex<()>,
}

impl JsonlEventStore {
    /// Open (creating if needed) a store rooted at `base_dir`
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;

        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn stream_dir(&self, stream_id: Uuid) -> PathBuf {
        self.base_dir.join(stream_id.to_string())
    }

    /// Path to the events.jsonl file of a stream
    pub fn events_path(&self, stream_id: Uuid) -> PathBuf {
        self.stream_dir(stream_id).join(EVENTS_FILE)
    }
}

/// Committed events of a log plus the byte length they occupy
struct DecodedLog {
    events: Vec<StoredEvent>,
    committed_len: usize,
}

/// Decode a stream log.
///
/// Only newline-terminated lines count. Bytes after the last newline are a
/// torn write from an interrupted append and are left out.
fn decode_log(stream_id: Uuid, content: &[u8]) -> Result<DecodedLog, StoreError> {
    let committed_len = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);

    if committed_len < content.len() {
        warn!(
            stream_id = %stream_id,
            torn_bytes = content.len() - committed_len,
            "Ignoring unterminated trailing line in event log"
        );
    }

    let mut events = Vec::new();
    for line in content[..committed_len].split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        events.push(serde_json::from_slice(line)?);
    }

    Ok(DecodedLog {
        events,
        committed_len,
    })
}

fn read_log_file(path: &Path) -> std::io::Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Check the expected version and append under the stream's file lock
fn append_locked(
    stream_dir: &Path,
    stream_id: Uuid,
    aggregate_type: &str,
    expected_version: u64,
    events: Vec<NewEvent>,
) -> Result<u64, StoreError> {
    std::fs::create_dir_all(stream_dir)?;

    let lock = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(stream_dir.join(LOCK_FILE))?;
    lock.lock_exclusive()?;

    let events_path = stream_dir.join(EVENTS_FILE);
    let content = read_log_file(&events_path)?;
    let log = decode_log(stream_id, &content)?;

    let actual = log.events.len() as u64;
    if actual != expected_version {
        return Err(StoreError::Conflict {
            stream_id,
            expected: expected_version,
            actual,
        });
    }

    // Serialize the whole batch before touching the file so a bad
    // payload cannot leave a half-written append behind.
    let mut buffer = Vec::new();
    let mut version = actual;
    for event in events {
        version += 1;
        let stored = envelope(stream_id, aggregate_type, version, event);
        serde_json::to_writer(&mut buffer, &stored)?;
        buffer.push(b'\n');
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_path)?;
    if log.committed_len < content.len() {
        file.set_len(log.committed_len as u64)?;
    }
    file.write_all(&buffer)?;
    file.flush()?;

    // Lock is released when `lock` is dropped
    Ok(version)
}

#[async_trait]
impl EventStore for JsonlEventStore {
    async fn load(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        let content = match fs::read(self.events_path(stream_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(decode_log(stream_id, &content)?.events)
    }

    async fn append(
        &self,
        stream_id: Uuid,
        aggregate_type: &str,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let stream_dir = self.stream_dir(stream_id);
        let aggregate_type = aggregate_type.to_string();
        tokio::task::spawn_blocking(move || {
            append_locked(
                &stream_dir,
                stream_id,
                &aggregate_type,
                expected_version,
                events,
            )
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    async fn list_streams(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut streams = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        streams.push(uuid);
                    }
                }
            }
        }

        Ok(streams)
    }
}

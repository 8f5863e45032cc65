//! Generic load/save of event-sourced aggregates.

use std::marker::PhantomData;
use std::sync::Arc;

use uuid::Uuid;

use super::event_store::{EventStore, NewEvent, StoreError};

/// What a type must provide to be stored as an event stream.
///
/// `apply` is the pure fold; `encode`/`decode` map events to and from
/// `(event_type, payload)` pairs using an explicit per-type table.
pub trait Aggregate: Sized + Send {
    type Event: Send;

    const AGGREGATE_TYPE: &'static str;

    /// State before any event has been applied
    fn empty(id: Uuid) -> Self;

    fn apply(&mut self, event: &Self::Event);

    fn encode(event: &Self::Event) -> Result<(&'static str, serde_json::Value), serde_json::Error>;

    /// `None` when the event type is not known to this aggregate
    fn decode(
        event_type: &str,
        payload: serde_json::Value,
    ) -> Option<Result<Self::Event, serde_json::Error>>;

    fn id(&self) -> Uuid;

    /// Stream length observed at load (or after the last save)
    fn version(&self) -> u64;

    fn set_loaded_version(&mut self, version: u64);

    /// Events raised since the last save
    fn pending(&self) -> Vec<Self::Event>;

    fn mark_committed(&mut self, version: u64);
}

/// Loads aggregates by replay and saves their pending events
pub struct Repository<A> {
    store: Arc<dyn EventStore>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for Repository<A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _aggregate: PhantomData,
        }
    }
}

impl<A: Aggregate> Repository<A> {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            _aggregate: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Replay a stream; `None` if it has no events
    pub async fn load(&self, id: Uuid) -> Result<Option<A>, StoreError> {
        let stored = self.store.load(id).await?;
        if stored.is_empty() {
            return Ok(None);
        }

        let mut aggregate = A::empty(id);
        let version = stored.len() as u64;

        for envelope in stored {
            let event = A::decode(&envelope.event_type, envelope.data).ok_or_else(|| {
                StoreError::UnknownEventType {
                    stream_id: id,
                    event_type: envelope.event_type.clone(),
                }
            })??;
            aggregate.apply(&event);
        }

        aggregate.set_loaded_version(version);
        Ok(Some(aggregate))
    }

    /// Append pending events, conditioned on the version last loaded
    pub async fn save(&self, aggregate: &mut A) -> Result<(), StoreError> {
        let pending = aggregate.pending();
        if pending.is_empty() {
            return Ok(());
        }

        let mut events = Vec::with_capacity(pending.len());
        for event in &pending {
            let (event_type, data) = A::encode(event)?;
            events.push(NewEvent::new(event_type, data));
        }

        let version = self
            .store
            .append(aggregate.id(), A::AGGREGATE_TYPE, aggregate.version(), events)
            .await?;
        aggregate.mark_committed(version);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_store::InMemoryEventStore;
    use crate::domain::{ImportPreview, ImportSession, ImportStatus, ParsedData};

    fn repository() -> Repository<ImportSession> {
        Repository::new(Arc::new(InMemoryEventStore::new()))
    }

    fn new_session() -> ImportSession {
        ImportSession::create(
            "archimate-openexchange",
            None,
            None,
            ImportPreview::default(),
            ParsedData::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let repo = repository();
        let mut session = new_session();
        repo.save(&mut session).await.unwrap();

        assert!(session.pending_events().is_empty());
        assert_eq!(session.version(), 1);

        let loaded = repo.load(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ImportStatus::Pending);
        assert_eq!(loaded.version(), 1);
    }

    #[tokio::test]
    async fn test_missing_stream() {
        let repo = repository();
        assert!(repo.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_copy_is_rejected() {
        let repo = repository();
        let mut session = new_session();
        repo.save(&mut session).await.unwrap();

        let mut first = repo.load(session.id).await.unwrap().unwrap();
        let mut second = repo.load(session.id).await.unwrap().unwrap();

        first.start_import().unwrap();
        repo.save(&mut first).await.unwrap();

        second.cancel().unwrap();
        let err = repo.save(&mut second).await.unwrap_err();
        assert!(err.is_conflict());

        let reloaded = repo.load(session.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ImportStatus::Importing);
    }

    #[tokio::test]
    async fn test_unknown_event_type_fails_load() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let id = Uuid::new_v4();
        store
            .append(
                id,
                ImportSession::AGGREGATE_TYPE,
                0,
                vec![NewEvent::new("import_teleported", serde_json::json!({}))],
            )
            .await
            .unwrap();

        let repo: Repository<ImportSession> = Repository::new(store);
        let err = repo.load(id).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownEventType { .. }));
    }

    #[tokio::test]
    async fn test_save_without_changes_is_noop() {
        let repo = repository();
        let mut session = new_session();
        repo.save(&mut session).await.unwrap();
        repo.save(&mut session).await.unwrap();

        assert_eq!(repo.store().load(session.id).await.unwrap().len(), 1);
    }
}

//! In-memory event store for the `PointCore` ledger.
//!
//! Implements the [`EventStore`] port with plain maps behind
//! `parking_lot` locks: per-stream logs for command reads plus one global
//! append log serving the projection feed. Intended for tests and
//! development; it honors the same expected-version contract as a durable
//! backend, so concurrency behavior carries over.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use pointcore::errors::{EventStoreError, EventStoreResult};
use pointcore::event_store::{
    EventStore, ExpectedVersion, ReadOptions, StoredEvent, StreamData, StreamEvents,
};
use pointcore::types::{EventId, EventVersion, StreamId, Timestamp};

#[derive(Default)]
struct Inner<E> {
    streams: HashMap<StreamId, Vec<StoredEvent<E>>>,
    versions: HashMap<StreamId, EventVersion>,
    log: Vec<StoredEvent<E>>,
    event_ids: HashSet<EventId>,
}

/// Thread-safe in-memory event store.
///
/// Cloning is cheap and shares storage, so an executor, a projection
/// runner, and a test can all hold the same store.
pub struct InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    inner: Arc<RwLock<Inner<E>>>,
}

impl<E> Clone for InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    /// An empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                streams: HashMap::new(),
                versions: HashMap::new(),
                log: Vec::new(),
                event_ids: HashSet::new(),
            })),
        }
    }

    /// Total number of events across all streams.
    pub fn event_count(&self) -> usize {
        self.inner.read().log.len()
    }
}

impl<E> Default for InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> EventStore for InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    type Event = E;

    async fn read_streams(
        &self,
        stream_ids: &[StreamId],
        options: &ReadOptions,
    ) -> EventStoreResult<StreamData<E>> {
        let inner = self.inner.read();

        let mut events = Vec::new();
        let mut stream_versions = HashMap::new();

        for stream_id in stream_ids {
            let version = inner
                .versions
                .get(stream_id)
                .copied()
                .unwrap_or_else(EventVersion::initial);
            stream_versions.insert(stream_id.clone(), version);

            if let Some(stream) = inner.streams.get(stream_id) {
                for event in stream {
                    if options
                        .from_version
                        .is_some_and(|from| event.event_version < from)
                    {
                        continue;
                    }
                    if options
                        .to_version
                        .is_some_and(|to| event.event_version > to)
                    {
                        continue;
                    }
                    events.push(event.clone());
                }
            }
        }

        // event ids are v7, so this is creation order across streams
        events.sort_by_key(|event| event.event_id);
        if let Some(max_events) = options.max_events {
            events.truncate(max_events);
        }

        Ok(StreamData::new(events, stream_versions))
    }

    async fn write_events(
        &self,
        stream_events: Vec<StreamEvents<E>>,
    ) -> EventStoreResult<HashMap<StreamId, EventVersion>> {
        let mut inner = self.inner.write();

        // check every precondition before touching anything
        for batch in &stream_events {
            let current = inner
                .versions
                .get(&batch.stream_id)
                .copied()
                .unwrap_or_else(EventVersion::initial);

            match batch.expected_version {
                ExpectedVersion::New => {
                    if inner.versions.contains_key(&batch.stream_id) {
                        return Err(EventStoreError::VersionConflict {
                            stream: batch.stream_id.clone(),
                            expected: EventVersion::initial(),
                            current,
                        });
                    }
                }
                ExpectedVersion::Exact(expected) => {
                    if current != expected {
                        return Err(EventStoreError::VersionConflict {
                            stream: batch.stream_id.clone(),
                            expected,
                            current,
                        });
                    }
                }
                ExpectedVersion::Any => {}
            }

            for event in &batch.events {
                if inner.event_ids.contains(&event.event_id) {
                    return Err(EventStoreError::DuplicateEventId(event.event_id));
                }
            }
        }

        let mut new_versions = HashMap::new();
        for batch in stream_events {
            let mut version = inner
                .versions
                .get(&batch.stream_id)
                .copied()
                .unwrap_or_else(EventVersion::initial);

            for event in batch.events {
                version = version.next();
                let stored = StoredEvent::new(
                    event.event_id,
                    batch.stream_id.clone(),
                    version,
                    Timestamp::now(),
                    event.payload,
                    event.metadata,
                );
                inner.event_ids.insert(stored.event_id);
                inner
                    .streams
                    .entry(batch.stream_id.clone())
                    .or_default()
                    .push(stored.clone());
                inner.log.push(stored);
            }

            inner.versions.insert(batch.stream_id.clone(), version);
            new_versions.insert(batch.stream_id, version);
        }

        Ok(new_versions)
    }

    async fn stream_exists(&self, stream_id: &StreamId) -> EventStoreResult<bool> {
        Ok(self.inner.read().streams.contains_key(stream_id))
    }

    async fn get_stream_version(
        &self,
        stream_id: &StreamId,
    ) -> EventStoreResult<Option<EventVersion>> {
        Ok(self.inner.read().versions.get(stream_id).copied())
    }

    async fn read_all_events(
        &self,
        after: Option<EventId>,
        max_events: usize,
    ) -> EventStoreResult<Vec<StoredEvent<E>>> {
        let inner = self.inner.read();
        // the log is appended under the same lock as the version bump, so
        // it is already in event-id order
        let start = after.map_or(0, |after| {
            inner
                .log
                .partition_point(|event| event.event_id <= after)
        });
        Ok(inner.log[start..]
            .iter()
            .take(max_events)
            .cloned()
            .collect())
    }
}

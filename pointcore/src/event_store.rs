//! Event store port: the write-side persistence boundary.
//!
//! The trait is backend-independent. An implementation must offer atomic
//! appends with expected-version checking (the optimistic-concurrency
//! primitive every command relies on) and a globally ordered feed for the
//! projection runner.

use crate::errors::EventStoreResult;
use crate::types::{EventId, EventVersion, StreamId, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event as it exists in the store, with full addressing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    /// Globally unique, time-ordered identity.
    pub event_id: EventId,
    /// The stream the event was appended to.
    pub stream_id: StreamId,
    /// Position within that stream.
    pub event_version: EventVersion,
    /// When the store accepted the event.
    pub timestamp: Timestamp,
    /// The domain payload.
    pub payload: E,
    /// Optional tracing metadata.
    pub metadata: Option<EventMetadata>,
}

impl<E> StoredEvent<E> {
    /// Assembles a stored event.
    pub const fn new(
        event_id: EventId,
        stream_id: StreamId,
        event_version: EventVersion,
        timestamp: Timestamp,
        payload: E,
        metadata: Option<EventMetadata>,
    ) -> Self {
        Self {
            event_id,
            stream_id,
            event_version,
            timestamp,
            payload,
            metadata,
        }
    }
}

/// Correlation metadata attached to events at write time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// The event that caused this one, if any.
    pub causation_id: Option<EventId>,
    /// Ties together events produced by one external request.
    pub correlation_id: Option<String>,
    /// Who initiated the change.
    pub user_id: Option<String>,
}

impl EventMetadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the causation id.
    #[must_use]
    pub const fn with_causation_id(mut self, causation_id: EventId) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the initiating user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// An event waiting to be appended.
#[derive(Debug, Clone)]
pub struct EventToWrite<E> {
    /// Client-assigned identity (must be UUIDv7).
    pub event_id: EventId,
    /// The domain payload.
    pub payload: E,
    /// Optional tracing metadata.
    pub metadata: Option<EventMetadata>,
}

impl<E> EventToWrite<E> {
    /// An event without metadata.
    pub const fn new(event_id: EventId, payload: E) -> Self {
        Self {
            event_id,
            payload,
            metadata: None,
        }
    }

    /// An event carrying metadata.
    pub const fn with_metadata(event_id: EventId, payload: E, metadata: EventMetadata) -> Self {
        Self {
            event_id,
            payload,
            metadata: Some(metadata),
        }
    }
}

/// Version precondition for an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    New,
    /// The stream must be at exactly this version.
    Exact(EventVersion),
    /// No precondition; last writer wins.
    Any,
}

/// A batch of events destined for one stream.
#[derive(Debug, Clone)]
pub struct StreamEvents<E> {
    /// The target stream.
    pub stream_id: StreamId,
    /// Precondition checked before anything is written.
    pub expected_version: ExpectedVersion,
    /// Events to append, in order.
    pub events: Vec<EventToWrite<E>>,
}

impl<E> StreamEvents<E> {
    /// Assembles a write batch.
    pub const fn new(
        stream_id: StreamId,
        expected_version: ExpectedVersion,
        events: Vec<EventToWrite<E>>,
    ) -> Self {
        Self {
            stream_id,
            expected_version,
            events,
        }
    }
}

/// Bounds for a stream read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Read at most this many events.
    pub max_events: Option<usize>,
    /// Skip events below this version.
    pub from_version: Option<EventVersion>,
    /// Skip events above this version.
    pub to_version: Option<EventVersion>,
}

impl ReadOptions {
    /// Unbounded read.
    pub const fn new() -> Self {
        Self {
            max_events: None,
            from_version: None,
            to_version: None,
        }
    }

    /// Caps the number of events returned.
    #[must_use]
    pub const fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    /// Starts at the given version (inclusive).
    #[must_use]
    pub const fn from_version(mut self, version: EventVersion) -> Self {
        self.from_version = Some(version);
        self
    }

    /// Stops at the given version (inclusive).
    #[must_use]
    pub const fn to_version(mut self, version: EventVersion) -> Self {
        self.to_version = Some(version);
        self
    }
}

/// Result of reading one or more streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamData<E> {
    /// Events from every requested stream, ordered by [`EventId`].
    pub events: Vec<StoredEvent<E>>,
    /// The version each requested stream was at when read. Streams that do
    /// not exist yet report the initial version.
    pub stream_versions: HashMap<StreamId, EventVersion>,
}

impl<E> StreamData<E> {
    /// Assembles stream data.
    pub const fn new(
        events: Vec<StoredEvent<E>>,
        stream_versions: HashMap<StreamId, EventVersion>,
    ) -> Self {
        Self {
            events,
            stream_versions,
        }
    }

    /// Whether no events were found.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events read.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// The as-read version of a stream, if it was requested.
    pub fn stream_version(&self, stream_id: &StreamId) -> Option<EventVersion> {
        self.stream_versions.get(stream_id).copied()
    }

    /// Iterates the events of one stream.
    pub fn events_for_stream<'a>(
        &'a self,
        stream_id: &'a StreamId,
    ) -> impl Iterator<Item = &'a StoredEvent<E>> + 'a {
        self.events
            .iter()
            .filter(move |event| &event.stream_id == stream_id)
    }
}

/// The write-side persistence port.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The event payload type this store persists.
    type Event: Send + Sync;

    /// Reads the given streams and reports their as-read versions.
    ///
    /// Events from all streams are merged and ordered by [`EventId`], which
    /// is creation order. Nonexistent streams are not an error: they come
    /// back empty at the initial version, so first-write commands can use
    /// the same read path as every other command.
    async fn read_streams(
        &self,
        stream_ids: &[StreamId],
        options: &ReadOptions,
    ) -> EventStoreResult<StreamData<Self::Event>>;

    /// Appends events to one or more streams atomically.
    ///
    /// Every batch's expected version is checked before any event is
    /// written; a single mismatch fails the whole call with
    /// [`crate::errors::EventStoreError::VersionConflict`] and nothing is
    /// applied.
    async fn write_events(
        &self,
        stream_events: Vec<StreamEvents<Self::Event>>,
    ) -> EventStoreResult<HashMap<StreamId, EventVersion>>;

    /// Whether a stream has at least one event.
    async fn stream_exists(&self, stream_id: &StreamId) -> EventStoreResult<bool>;

    /// Current version of a stream, `None` if it does not exist.
    async fn get_stream_version(
        &self,
        stream_id: &StreamId,
    ) -> EventStoreResult<Option<EventVersion>>;

    /// Reads the global feed: every event across all streams, ordered by
    /// [`EventId`], strictly after `after` (from the beginning when `None`),
    /// up to `max_events`. This is the projection runner's input.
    async fn read_all_events(
        &self,
        after: Option<EventId>,
        max_events: usize,
    ) -> EventStoreResult<Vec<StoredEvent<Self::Event>>>;
}

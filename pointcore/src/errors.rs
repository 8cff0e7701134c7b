//! Error types for the ledger engine.
//!
//! Each layer has its own error enum so callers can tell business rejections
//! (insufficient points), retryable races (version conflicts), and
//! infrastructure failures apart. Conversions between layers preserve that
//! distinction: a store-level version conflict becomes a command-level
//! concurrency conflict, which the executor knows how to retry.

use crate::account::types::{AccountId, PointsTransferId};
use crate::types::{EventId, EventVersion, StreamId};
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced to command dispatchers.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// The command input was rejected before any state was touched.
    /// Rare in practice: most validation happens in smart constructors.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The spend exceeds the account's active balance and advance spending
    /// was not enabled. Nothing was applied.
    #[error("insufficient points: {requested} requested, {available} available")]
    InsufficientPoints {
        /// Active balance at evaluation time.
        available: i64,
        /// Points the spend asked for.
        requested: u64,
    },

    /// The addressed account has no creation event in its stream.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// An account creation targeted an id that is already in use.
    #[error("account already exists: {0}")]
    AccountAlreadyExists(AccountId),

    /// The transfer has been consumed (fully or in part) and can no longer
    /// be withdrawn from the ledger.
    #[error("transfer cannot be canceled: {0}")]
    TransferNotCancelable(PointsTransferId),

    /// Another writer advanced the account stream between read and append.
    /// Retry by reloading and re-deciding.
    #[error("concurrency conflict on stream '{stream}'")]
    ConcurrencyConflict {
        /// The stream whose version moved.
        stream: StreamId,
    },

    /// The dispatch exceeded the caller-supplied bound. The command's
    /// effect is unknown; retries must rely on transfer-id idempotency.
    #[error("command dispatch timed out after {0:?}")]
    Timeout(Duration),

    /// The event store failed for a non-conflict reason.
    #[error("event store error: {0}")]
    EventStore(EventStoreError),

    /// A bug, not an expected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures at the persistence layer.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The requested stream does not exist.
    #[error("stream '{0}' not found")]
    StreamNotFound(StreamId),

    /// The expected-version check failed on append.
    #[error("version conflict on stream '{stream}': expected {expected}, current {current}")]
    VersionConflict {
        /// The contested stream.
        stream: StreamId,
        /// Version the writer expected.
        expected: EventVersion,
        /// Version actually found.
        current: EventVersion,
    },

    /// An event with this id is already stored.
    #[error("duplicate event id: {0}")]
    DuplicateEventId(EventId),

    /// The store could not be reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The store operation exceeded its deadline.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store is temporarily refusing work.
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    /// An I/O error from the storage backend.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A bug, not an expected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for EventStoreError {
    fn clone(&self) -> Self {
        match self {
            Self::StreamNotFound(stream) => Self::StreamNotFound(stream.clone()),
            Self::VersionConflict {
                stream,
                expected,
                current,
            } => Self::VersionConflict {
                stream: stream.clone(),
                expected: *expected,
                current: *current,
            },
            Self::DuplicateEventId(event_id) => Self::DuplicateEventId(*event_id),
            Self::ConnectionFailed(msg) => Self::ConnectionFailed(msg.clone()),
            Self::Timeout(duration) => Self::Timeout(*duration),
            Self::Unavailable(msg) => Self::Unavailable(msg.clone()),
            Self::Io(err) => Self::Io(std::io::Error::new(err.kind(), err.to_string())),
            Self::Internal(msg) => Self::Internal(msg.clone()),
        }
    }
}

/// Failures while materializing read models from the event feed.
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// A specific event could not be applied.
    #[error("failed to project event {event_id}: {reason}")]
    EventProcessingFailed {
        /// The offending event.
        event_id: EventId,
        /// Why it failed.
        reason: String,
    },

    /// The projection's resume position could not be loaded.
    #[error("failed to load checkpoint: {0}")]
    CheckpointLoadFailed(String),

    /// The projection's resume position could not be saved.
    #[error("failed to save checkpoint: {0}")]
    CheckpointSaveFailed(String),

    /// The underlying event feed failed.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A bug, not an expected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for command dispatch.
pub type CommandResult<T> = Result<T, CommandError>;

/// Result alias for event store operations.
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Result alias for projection operations.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

impl From<EventStoreError> for CommandError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::VersionConflict { stream, .. } => {
                Self::ConcurrencyConflict { stream }
            }
            other => Self::EventStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_becomes_concurrency_conflict() {
        let stream = StreamId::try_new("account-1").unwrap();
        let err = EventStoreError::VersionConflict {
            stream: stream.clone(),
            expected: EventVersion::initial(),
            current: EventVersion::initial().next(),
        };
        match CommandError::from(err) {
            CommandError::ConcurrencyConflict { stream: s } => assert_eq!(s, stream),
            other => panic!("expected concurrency conflict, got {other}"),
        }
    }

    #[test]
    fn other_store_errors_pass_through() {
        let err = EventStoreError::Unavailable("maintenance".to_string());
        assert!(matches!(
            CommandError::from(err),
            CommandError::EventStore(EventStoreError::Unavailable(_))
        ));
    }

    #[test]
    fn messages_carry_the_relevant_numbers() {
        let err = CommandError::InsufficientPoints {
            available: 100,
            requested: 150,
        };
        assert_eq!(
            err.to_string(),
            "insufficient points: 150 requested, 100 available"
        );

        let err = EventStoreError::VersionConflict {
            stream: StreamId::try_new("account-7").unwrap(),
            expected: EventVersion::initial(),
            current: EventVersion::initial().next(),
        };
        assert_eq!(
            err.to_string(),
            "version conflict on stream 'account-7': expected 0, current 1"
        );
    }

    #[test]
    fn store_errors_clone_including_io() {
        let err = EventStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        let cloned = err.clone();
        assert!(matches!(cloned, EventStoreError::Io(_)));
    }
}

//! Projection checkpoints: where each projection resumes in the feed.

use crate::cqrs::CqrsResult;
use crate::types::{EventId, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The last feed position a projection has fully applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionCheckpoint {
    /// Last applied event, `None` before the first batch.
    pub last_event_id: Option<EventId>,
    /// When the checkpoint was taken.
    pub checkpoint_time: Timestamp,
}

impl ProjectionCheckpoint {
    /// A checkpoint at the beginning of the feed.
    pub fn initial() -> Self {
        Self {
            last_event_id: None,
            checkpoint_time: Timestamp::now(),
        }
    }

    /// A checkpoint directly after the given event.
    pub fn from_event_id(event_id: EventId) -> Self {
        Self {
            last_event_id: Some(event_id),
            checkpoint_time: Timestamp::now(),
        }
    }
}

/// Persistence port for projection checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Loads a projection's checkpoint, `None` if it never saved one.
    async fn load(&self, projection_name: &str) -> CqrsResult<Option<ProjectionCheckpoint>>;

    /// Saves (replacing) a projection's checkpoint.
    async fn save(
        &self,
        projection_name: &str,
        checkpoint: ProjectionCheckpoint,
    ) -> CqrsResult<()>;

    /// Deletes a projection's checkpoint, used before a rebuild.
    async fn delete(&self, projection_name: &str) -> CqrsResult<()>;
}

/// In-memory checkpoint store for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, ProjectionCheckpoint>>,
}

impl InMemoryCheckpointStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, projection_name: &str) -> CqrsResult<Option<ProjectionCheckpoint>> {
        Ok(self.checkpoints.read().get(projection_name).cloned())
    }

    async fn save(
        &self,
        projection_name: &str,
        checkpoint: ProjectionCheckpoint,
    ) -> CqrsResult<()> {
        self.checkpoints
            .write()
            .insert(projection_name.to_string(), checkpoint);
        Ok(())
    }

    async fn delete(&self, projection_name: &str) -> CqrsResult<()> {
        self.checkpoints.write().remove(projection_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_delete_roundtrip() {
        let store = InMemoryCheckpointStore::new();
        assert_eq!(store.load("transfers").await.unwrap(), None);

        let checkpoint = ProjectionCheckpoint::from_event_id(EventId::new());
        store.save("transfers", checkpoint.clone()).await.unwrap();
        assert_eq!(store.load("transfers").await.unwrap(), Some(checkpoint));

        store.delete("transfers").await.unwrap();
        assert_eq!(store.load("transfers").await.unwrap(), None);
    }

    #[test]
    fn initial_checkpoint_has_no_position() {
        assert_eq!(ProjectionCheckpoint::initial().last_event_id, None);
    }
}

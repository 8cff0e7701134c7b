//! Drives a projection over the global event feed.
//!
//! The runner polls the store for events after the projection's checkpoint,
//! applies them in feed order, and advances the checkpoint per batch. The
//! checkpoint is saved only after every event of the batch applied, so a
//! crash mid-batch replays the batch — projections are upsert-based and
//! converge.

use crate::cqrs::checkpoint::{CheckpointStore, ProjectionCheckpoint};
use crate::cqrs::projection::Projection;
use crate::errors::{ProjectionError, ProjectionResult};
use crate::event_store::EventStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument};

const DEFAULT_BATCH_SIZE: usize = 256;

/// Polls the event feed and applies it to one projection.
pub struct ProjectionRunner<ES>
where
    ES: EventStore,
{
    event_store: Arc<ES>,
    projection: Arc<dyn Projection<Event = ES::Event>>,
    checkpoints: Arc<dyn CheckpointStore>,
    batch_size: usize,
}

impl<ES> ProjectionRunner<ES>
where
    ES: EventStore,
{
    /// Runner for the given projection with the default batch size.
    pub fn new(
        event_store: Arc<ES>,
        projection: Arc<dyn Projection<Event = ES::Event>>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            event_store,
            projection,
            checkpoints,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Overrides how many events are pulled per poll.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Applies everything currently in the feed, returning how many events
    /// were processed.
    #[instrument(skip(self), fields(projection = self.projection.name()))]
    pub async fn catch_up(&self) -> ProjectionResult<usize> {
        let name = self.projection.name().to_string();
        let mut applied = 0;

        loop {
            let after = self
                .checkpoints
                .load(&name)
                .await
                .map_err(|e| ProjectionError::CheckpointLoadFailed(e.to_string()))?
                .and_then(|checkpoint| checkpoint.last_event_id);

            let events = self
                .event_store
                .read_all_events(after, self.batch_size)
                .await?;
            let Some(last) = events.last() else {
                break;
            };
            let checkpoint = ProjectionCheckpoint::from_event_id(last.event_id);

            for event in &events {
                self.projection.apply(event).await?;
            }
            applied += events.len();

            self.checkpoints
                .save(&name, checkpoint)
                .await
                .map_err(|e| ProjectionError::CheckpointSaveFailed(e.to_string()))?;
        }

        if applied > 0 {
            debug!(applied, "projection caught up");
        }
        Ok(applied)
    }

    /// Polls on an interval until the shutdown signal fires. Poll failures
    /// are logged and retried on the next tick; the loop never dies on a
    /// transient store error.
    pub async fn run(
        &self,
        poll_interval: Duration,
        mut shutdown: oneshot::Receiver<()>,
    ) -> ProjectionResult<()> {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(projection = self.projection.name(), "projection runner stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.catch_up().await {
                        error!(projection = self.projection.name(), error = %err, "projection poll failed");
                    }
                }
            }
        }
    }
}

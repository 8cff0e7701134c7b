//! Command execution against an event store.
//!
//! The executor owns the full dispatch lifecycle: read the command's
//! streams, fold state, run the decision, and append the resulting events
//! with an exact expected version per touched stream. A concurrent writer
//! on any of those streams turns the append into a
//! [`CommandError::ConcurrencyConflict`], which `execute_with_retry`
//! resolves by reloading and re-deciding — per-account serialization
//! without a lock.

use crate::command::{Command, CommandResult};
use crate::errors::CommandError;
use crate::event_store::{
    EventMetadata, EventStore, EventToWrite, ExpectedVersion, ReadOptions, StreamEvents,
};
use crate::types::{EventId, EventVersion, StreamId};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Retry behavior for conflicted dispatches.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for the backoff.
    pub max_delay: Duration,
    /// Exponential growth factor between attempts.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

/// Which errors are worth retrying.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Retry only optimistic-concurrency conflicts (the default: business
    /// rejections and infrastructure failures are surfaced immediately).
    #[default]
    ConcurrencyConflictsOnly,
    /// Caller-defined predicate.
    Custom(fn(&CommandError) -> bool),
}

impl RetryPolicy {
    /// Whether this error should trigger another attempt.
    pub fn should_retry(&self, error: &CommandError) -> bool {
        match self {
            Self::ConcurrencyConflictsOnly => {
                matches!(error, CommandError::ConcurrencyConflict { .. })
            }
            Self::Custom(predicate) => predicate(error),
        }
    }
}

/// Tracing context attached to every event a dispatch writes.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Correlates all events of one external request.
    pub correlation_id: String,
    /// Who initiated the command, for auditing.
    pub user_id: Option<String>,
}

impl ExecutionContext {
    /// Context with a fresh correlation id.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::now_v7().to_string(),
            user_id: None,
        }
    }

    /// Attaches the initiating user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn event_metadata(&self) -> EventMetadata {
        let metadata = EventMetadata::new().with_correlation_id(self.correlation_id.clone());
        match &self.user_id {
            Some(user_id) => metadata.with_user_id(user_id.clone()),
            None => metadata,
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What a successful dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// How many events were appended. Zero means the command was an
    /// idempotent no-op (e.g. a replayed transfer id).
    pub events_written: usize,
    /// The new version of every stream that was written to.
    pub stream_versions: HashMap<StreamId, EventVersion>,
}

impl ExecutionOutcome {
    /// Whether the dispatch changed nothing.
    pub fn is_noop(&self) -> bool {
        self.events_written == 0
    }
}

/// Executes commands against an event store.
#[derive(Debug)]
pub struct CommandExecutor<ES> {
    event_store: ES,
    retry_config: RetryConfig,
    retry_policy: RetryPolicy,
    command_timeout: Option<Duration>,
}

impl<ES> CommandExecutor<ES>
where
    ES: EventStore,
{
    /// Executor with default retry behavior and no dispatch timeout.
    pub fn new(event_store: ES) -> Self {
        Self {
            event_store,
            retry_config: RetryConfig::default(),
            retry_policy: RetryPolicy::default(),
            command_timeout: None,
        }
    }

    /// Replaces the retry configuration.
    #[must_use]
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Bounds every dispatch attempt. On expiry the attempt fails with
    /// [`CommandError::Timeout`] and its effect is unknown; callers lean on
    /// transfer-id idempotency when they retry.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Borrows the underlying store.
    pub const fn event_store(&self) -> &ES {
        &self.event_store
    }

    /// Runs one dispatch: read streams, fold state, decide, append.
    #[instrument(skip_all, fields(correlation_id = %context.correlation_id))]
    pub async fn execute<C>(
        &self,
        command: &C,
        input: C::Input,
        context: &ExecutionContext,
    ) -> CommandResult<ExecutionOutcome>
    where
        C: Command<Event = ES::Event>,
    {
        let attempt = self.execute_once(command, input, context);
        match self.command_timeout {
            Some(timeout) => tokio::time::timeout(timeout, attempt)
                .await
                .map_err(|_| CommandError::Timeout(timeout))?,
            None => attempt.await,
        }
    }

    /// Runs a dispatch, retrying conflicted attempts with jittered
    /// exponential backoff. Business rejections are never retried.
    #[instrument(skip_all, fields(correlation_id = %context.correlation_id))]
    pub async fn execute_with_retry<C>(
        &self,
        command: &C,
        input: C::Input,
        context: &ExecutionContext,
    ) -> CommandResult<ExecutionOutcome>
    where
        C: Command<Event = ES::Event>,
        C::Input: Clone,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute(command, input.clone(), context).await {
                Ok(outcome) => return Ok(outcome),
                Err(error)
                    if self.retry_policy.should_retry(&error)
                        && attempt < self.retry_config.max_attempts =>
                {
                    let delay = self.retry_delay(attempt);
                    warn!(%error, attempt, ?delay, "retrying conflicted dispatch");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn execute_once<C>(
        &self,
        command: &C,
        input: C::Input,
        context: &ExecutionContext,
    ) -> CommandResult<ExecutionOutcome>
    where
        C: Command<Event = ES::Event>,
    {
        let stream_ids = command.read_streams(&input);
        let data = self
            .event_store
            .read_streams(&stream_ids, &ReadOptions::new())
            .await?;

        let mut state = C::State::default();
        for event in &data.events {
            command.apply(&mut state, event);
        }

        let new_events = command.handle(state, input).await?;
        if new_events.is_empty() {
            debug!("command was an idempotent no-op");
            return Ok(ExecutionOutcome {
                events_written: 0,
                stream_versions: data.stream_versions,
            });
        }
        let events_written = new_events.len();

        // Preserve emission order per stream while grouping for the append.
        let mut batches: Vec<StreamEvents<ES::Event>> = Vec::new();
        for (stream_id, payload) in new_events {
            let event = EventToWrite::with_metadata(
                EventId::new(),
                payload,
                context.event_metadata(),
            );
            if let Some(batch) = batches.iter_mut().find(|b| b.stream_id == stream_id) {
                batch.events.push(event);
            } else {
                let expected = data
                    .stream_version(&stream_id)
                    .map_or(ExpectedVersion::Any, ExpectedVersion::Exact);
                batches.push(StreamEvents::new(stream_id, expected, vec![event]));
            }
        }

        let stream_versions = self.event_store.write_events(batches).await?;
        debug!(events_written, "dispatch appended events");
        Ok(ExecutionOutcome {
            events_written,
            stream_versions,
        })
    }

    /// Backoff before the retry following `attempt`, with ±25% jitter so
    /// simultaneous losers of a conflict do not collide again.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    fn retry_delay(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_ms = self.retry_config.base_delay.as_millis() as f64;
        let max_ms = self.retry_config.max_delay.as_millis() as f64;
        let delay = (base_ms
            * self
                .retry_config
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32))
        .min(max_ms);

        let mut rng = rand::rng();
        let jitter = delay * 0.25 * (rng.random::<f64>() - 0.5) * 2.0;
        Duration::from_millis((delay + jitter).clamp(0.0, max_ms) as u64)
    }
}

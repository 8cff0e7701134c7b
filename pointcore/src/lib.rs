//! `PointCore` — an event-sourced loyalty points ledger.
//!
//! The write side is one event stream per loyalty account: commands fold
//! the stream into an [`account::AccountState`], decide, and append new
//! events under an exact expected version, so concurrent commands on the
//! same account serialize through optimistic retries. The read side is a
//! set of denormalized views ([`cqrs::PointsTransferDetails`],
//! [`cqrs::AccountDetails`]) maintained by projections off the global
//! event feed, serving reporting queries and the expiry scheduler's scan.
//!
//! # Wiring
//!
//! ```rust,ignore
//! let store = Arc::new(InMemoryEventStore::<AccountEvent>::new());
//! let executor = Arc::new(CommandExecutor::new(store.clone()));
//!
//! let transfers = Arc::new(InMemoryPointsTransferDetailsRepository::new());
//! let projection = Arc::new(PointsTransferDetailsProjection::new(transfers.clone()));
//! let runner = ProjectionRunner::new(store, projection, Arc::new(InMemoryCheckpointStore::new()));
//!
//! let scheduler = ExpiryScheduler::new(executor.clone(), transfers, SchedulerConfig::default());
//!
//! executor.execute(&AddPoints, input, &ExecutionContext::new()).await?;
//! runner.catch_up().await?;
//! scheduler.run_once(Timestamp::now()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod command;
pub mod cqrs;
pub mod errors;
pub mod event_store;
pub mod executor;
pub mod scheduler;
pub mod types;

pub use command::{Command, CommandResult};
pub use errors::{CommandError, EventStoreError, ProjectionError};
pub use event_store::{
    EventMetadata, EventStore, EventToWrite, ExpectedVersion, ReadOptions, StoredEvent,
    StreamData, StreamEvents,
};
pub use executor::{
    CommandExecutor, ExecutionContext, ExecutionOutcome, RetryConfig, RetryPolicy,
};
pub use scheduler::{ExpiryRunSummary, ExpiryScheduler, SchedulerConfig};
pub use types::{EventId, EventVersion, StreamId, Timestamp};

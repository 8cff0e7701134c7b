//! The command abstraction: load state, decide, emit events.
//!
//! A command names the streams it depends on, folds their events into a
//! state model, and turns state + input into new events. Both `apply` and
//! `handle` are pure: no clocks, no randomness, no I/O. Everything a
//! decision needs arrives in the input or is folded from the streams, which
//! is what makes optimistic retries safe — re-running a command against
//! fresh state is just calling the same functions again.
//!
//! In this ledger each account command reads and writes the single
//! `account-{id}` stream; that stream is the aggregate and the consistency
//! boundary.

use crate::errors::CommandError;
use crate::event_store::StoredEvent;
use crate::types::StreamId;
use async_trait::async_trait;

/// Result alias for command handling.
pub type CommandResult<T> = Result<T, CommandError>;

/// A self-contained unit of business logic over one or more event streams.
#[async_trait]
pub trait Command: Send + Sync {
    /// The command's input. Use smart-constructed types so an existing
    /// input is already valid.
    type Input: Send + Sync;

    /// The state model the command decides against. `Default` is the state
    /// of streams that have no events yet.
    type State: Default + Send + Sync;

    /// The event type the command emits.
    type Event: Send + Sync;

    /// Streams whose events must be folded before deciding. These same
    /// streams are version-checked on append, so a concurrent writer on any
    /// of them forces a retry with fresh state.
    fn read_streams(&self, input: &Self::Input) -> Vec<StreamId>;

    /// Folds one stored event into the state. Must be pure and tolerate
    /// replays: applying an event twice leaves the state as after once.
    fn apply(&self, state: &mut Self::State, stored_event: &StoredEvent<Self::Event>);

    /// Decides what happened. Returns the events to append, each paired
    /// with its target stream; an empty vector is a valid outcome and means
    /// the command was already applied (idempotent replay).
    async fn handle(
        &self,
        state: Self::State,
        input: Self::Input,
    ) -> CommandResult<Vec<(StreamId, Self::Event)>>;
}

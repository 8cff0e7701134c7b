//! The loyalty account domain: transfers, events, aggregate state, and the
//! commands that drive them.
//!
//! One account per customer; one event stream per account. The stream is
//! the consistency boundary: every invariant (non-negative balance,
//! expire-soonest-first consumption, idempotent expiry) is enforced by
//! folding that single stream.

pub mod commands;
pub mod events;
pub mod state;
pub mod transfer;
pub mod types;

pub use commands::{
    account_stream, AddPoints, AddPointsInput, CancelPointsTransfer, CancelPointsTransferInput,
    CreateAccount, CreateAccountInput, ExpirePointsTransfer, ExpirePointsTransferInput,
    SpendPoints, SpendPointsInput,
};
pub use events::{
    AccountCreated, AccountEvent, ConsumedPoints, PointsAdded, PointsSpent,
    PointsTransferCanceled, PointsTransferExpired, TransferState, TransferType,
};
pub use state::{AccountState, AddingEntry, CancelDecision, SpendPlan, SpendingEntry};
pub use transfer::{
    AddPointsTransfer, PointsTransferManager, SpendPointsTransfer, TransferError,
};
pub use types::{AccountId, CustomerId, Points, PointsTransferId, TransferComment};

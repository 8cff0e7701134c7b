//! Read side of the ledger: denormalized transfer and account views,
//! projections that maintain them from the event feed, and the checkpoint
//! plumbing that lets projections resume.
//!
//! Everything here is eventually consistent. The write side never reads
//! these views for decisions; they serve reporting queries and the expiry
//! scheduler's scan, both of which tolerate lag because the aggregate
//! operations they trigger are idempotent.

mod checkpoint;
mod projection;
mod read_model;
mod repository;
mod runner;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, ProjectionCheckpoint};
pub use projection::{AccountDetailsProjection, PointsTransferDetailsProjection, Projection};
pub use read_model::{AccountDetails, Pagination, PointsTransferDetails};
pub use repository::{
    AccountDetailsRepository, InMemoryAccountDetailsRepository,
    InMemoryPointsTransferDetailsRepository, PointsTransferDetailsRepository,
};
pub use runner::ProjectionRunner;

/// Result alias for read-side operations.
pub type CqrsResult<T> = Result<T, CqrsError>;

/// Failures in the read-side stores and checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CqrsError {
    /// A read-model store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A checkpoint operation failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Anything else.
    #[error("{0}")]
    Custom(String),
}

impl CqrsError {
    /// A storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// A checkpoint error.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// A custom error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

//! Domain events for the loyalty account ledger.
//!
//! Events are facts: past tense, immutable, and self-contained. Every
//! quantity a consumer needs (balance deltas, consumption breakdowns) is
//! recorded in the event at decision time, so folding a stream never has to
//! re-derive a decision.

use crate::account::types::{AccountId, CustomerId, Points, PointsTransferId, TransferComment};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Whether a ledger entry credits or debits the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    /// A credit of points.
    Adding,
    /// A redemption of points.
    Spending,
}

/// Lifecycle state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Spendable (adding) or counted (spending).
    Active,
    /// Adding transfer fully consumed by spends.
    Used,
    /// Adding transfer whose validity window elapsed.
    Expired,
    /// Withdrawn from the ledger.
    Canceled,
}

impl TransferState {
    /// Whether the state admits no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Canceled)
    }
}

/// One slice of a spend, charged against a specific adding transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedPoints {
    /// The adding transfer the points were taken from.
    pub source: PointsTransferId,
    /// How many of its remaining points were taken.
    pub amount: u64,
}

/// A loyalty account came into existence for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    /// The new account.
    pub account_id: AccountId,
    /// The customer it belongs to.
    pub customer_id: CustomerId,
}

/// Points were credited to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsAdded {
    /// The credited account.
    pub account_id: AccountId,
    /// Identity of the new adding transfer.
    pub transfer_id: PointsTransferId,
    /// Number of points credited.
    pub value: Points,
    /// Business creation time of the credit.
    pub created_at: Timestamp,
    /// When the credit expires; `None` means never.
    pub expires_at: Option<Timestamp>,
}

/// Points were redeemed from an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsSpent {
    /// The debited account.
    pub account_id: AccountId,
    /// Identity of the new spending transfer.
    pub transfer_id: PointsTransferId,
    /// Number of points redeemed.
    pub value: Points,
    /// Business creation time of the redemption.
    pub created_at: Timestamp,
    /// Optional operator note.
    pub comment: Option<TransferComment>,
    /// Which adding transfers covered the spend, oldest-expiring first.
    /// The breakdown is fixed at decision time so replays are deterministic.
    pub consumed: Vec<ConsumedPoints>,
    /// Portion not covered by any active transfer. Non-zero only for
    /// advance spends that were allowed to push the balance negative.
    pub overdrawn: u64,
}

/// An adding transfer's validity window elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTransferExpired {
    /// The account holding the transfer.
    pub account_id: AccountId,
    /// The expired adding transfer.
    pub transfer_id: PointsTransferId,
    /// Points that were still unspent when the window closed; this is the
    /// amount that leaves the active balance.
    pub unused_value: u64,
}

/// A transfer was withdrawn from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTransferCanceled {
    /// The account holding the transfer.
    pub account_id: AccountId,
    /// The canceled transfer.
    pub transfer_id: PointsTransferId,
    /// Which side of the ledger the transfer was on.
    pub transfer_type: TransferType,
    /// Face value of the canceled transfer.
    pub value: u64,
    /// Unspent points removed from the balance. Non-zero only when an
    /// adding transfer is canceled.
    pub voided_value: u64,
    /// Consumption returned to its source transfers. Non-empty only when a
    /// spending transfer is canceled and its sources can still be credited.
    pub restored: Vec<ConsumedPoints>,
    /// Overdraft cleared by canceling an advance spend.
    pub overdraft_cleared: u64,
}

/// Every event the account aggregate can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    /// An account was created.
    AccountCreated(AccountCreated),
    /// Points were credited.
    PointsAdded(PointsAdded),
    /// Points were redeemed.
    PointsSpent(PointsSpent),
    /// An adding transfer expired.
    PointsTransferExpired(PointsTransferExpired),
    /// A transfer was canceled.
    PointsTransferCanceled(PointsTransferCanceled),
}

impl AccountEvent {
    /// The account whose stream this event belongs to.
    pub const fn account_id(&self) -> AccountId {
        match self {
            Self::AccountCreated(e) => e.account_id,
            Self::PointsAdded(e) => e.account_id,
            Self::PointsSpent(e) => e.account_id,
            Self::PointsTransferExpired(e) => e.account_id,
            Self::PointsTransferCanceled(e) => e.account_id,
        }
    }
}

impl From<AccountCreated> for AccountEvent {
    fn from(event: AccountCreated) -> Self {
        Self::AccountCreated(event)
    }
}

impl From<PointsAdded> for AccountEvent {
    fn from(event: PointsAdded) -> Self {
        Self::PointsAdded(event)
    }
}

impl From<PointsSpent> for AccountEvent {
    fn from(event: PointsSpent) -> Self {
        Self::PointsSpent(event)
    }
}

impl From<PointsTransferExpired> for AccountEvent {
    fn from(event: PointsTransferExpired) -> Self {
        Self::PointsTransferExpired(event)
    }
}

impl From<PointsTransferCanceled> for AccountEvent {
    fn from(event: PointsTransferCanceled) -> Self {
        Self::PointsTransferCanceled(event)
    }
}

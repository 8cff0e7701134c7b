//! Transfer value objects and the factory that builds them.
//!
//! A transfer is an immutable description of one intended ledger entry. The
//! aggregate turns accepted transfers into events; the value objects here are
//! what commands carry in.

use crate::account::types::{Points, PointsTransferId, TransferComment};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing a transfer value object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The expiry instant precedes the creation instant.
    #[error("transfer expiry {expires_at} precedes creation {created_at}")]
    ExpiryBeforeCreation {
        /// When the transfer was created.
        created_at: Timestamp,
        /// The rejected expiry instant.
        expires_at: Timestamp,
    },
}

/// An intended credit of points to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPointsTransfer {
    /// Caller-supplied identity; doubles as the idempotency key.
    pub id: PointsTransferId,
    /// Number of points credited.
    pub value: Points,
    /// Business creation time of the credit.
    pub created_at: Timestamp,
    /// When the credit stops being spendable. `None` means it never expires.
    pub expires_at: Option<Timestamp>,
}

impl AddPointsTransfer {
    /// Builds a credit, validating that any expiry lies at or after creation.
    pub fn new(
        id: PointsTransferId,
        value: Points,
        created_at: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Result<Self, TransferError> {
        if let Some(expires_at) = expires_at {
            if expires_at < created_at {
                return Err(TransferError::ExpiryBeforeCreation {
                    created_at,
                    expires_at,
                });
            }
        }
        Ok(Self {
            id,
            value,
            created_at,
            expires_at,
        })
    }
}

/// An intended redemption of points from an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendPointsTransfer {
    /// Caller-supplied identity; doubles as the idempotency key.
    pub id: PointsTransferId,
    /// Number of points redeemed.
    pub value: Points,
    /// Business creation time of the redemption.
    pub created_at: Timestamp,
    /// Optional operator note ("reward pickup", "manual correction", ...).
    pub comment: Option<TransferComment>,
    /// When set, the spend is accepted even if it exceeds the active
    /// balance; the uncovered remainder is tracked as account overdraft.
    /// Honored only when explicitly enabled by the caller.
    pub allow_negative_balance: bool,
}

impl SpendPointsTransfer {
    /// Builds a redemption that must be covered by the active balance.
    pub fn new(
        id: PointsTransferId,
        value: Points,
        created_at: Timestamp,
        comment: Option<TransferComment>,
    ) -> Self {
        Self {
            id,
            value,
            created_at,
            comment,
            allow_negative_balance: false,
        }
    }

    /// Marks the redemption as advance spending: it may push the balance
    /// negative instead of being rejected.
    #[must_use]
    pub fn allowing_negative_balance(mut self) -> Self {
        self.allow_negative_balance = true;
        self
    }
}

/// Factory for adding transfers, owning the validity-window policy.
///
/// The manager is the single place that turns "valid for N days" into a
/// concrete expiry instant. It performs no I/O and reads no clock; callers
/// supply the creation time.
#[derive(Debug, Clone, Default)]
pub struct PointsTransferManager {
    default_validity_days: Option<u32>,
}

impl PointsTransferManager {
    /// Manager whose credits never expire unless a validity is passed
    /// per transfer.
    pub const fn new() -> Self {
        Self {
            default_validity_days: None,
        }
    }

    /// Manager that applies `days` of validity to every credit that does
    /// not specify its own.
    pub const fn with_default_validity_days(days: u32) -> Self {
        Self {
            default_validity_days: Some(days),
        }
    }

    /// Builds an [`AddPointsTransfer`], computing the expiry from the
    /// explicit validity, else the configured default, else never.
    pub fn create_add_points_transfer(
        &self,
        id: PointsTransferId,
        value: Points,
        created_at: Timestamp,
        validity_days: Option<u32>,
    ) -> AddPointsTransfer {
        let expires_at = validity_days
            .or(self.default_validity_days)
            .map(|days| created_at.plus_days(days));
        // expiry = creation + days can never precede creation
        AddPointsTransfer {
            id,
            value,
            created_at,
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(v: u64) -> Points {
        Points::try_new(v).unwrap()
    }

    #[test]
    fn add_transfer_rejects_expiry_before_creation() {
        let created_at = Timestamp::now();
        let result = AddPointsTransfer::new(
            PointsTransferId::new(),
            points(10),
            created_at,
            Some(created_at.minus_days(1)),
        );
        assert!(matches!(
            result,
            Err(TransferError::ExpiryBeforeCreation { .. })
        ));
    }

    #[test]
    fn add_transfer_accepts_expiry_equal_to_creation() {
        let created_at = Timestamp::now();
        let transfer = AddPointsTransfer::new(
            PointsTransferId::new(),
            points(10),
            created_at,
            Some(created_at),
        )
        .unwrap();
        assert_eq!(transfer.expires_at, Some(created_at));
    }

    #[test]
    fn manager_uses_explicit_validity_over_default() {
        let manager = PointsTransferManager::with_default_validity_days(30);
        let created_at = Timestamp::now();
        let transfer = manager.create_add_points_transfer(
            PointsTransferId::new(),
            points(100),
            created_at,
            Some(7),
        );
        assert_eq!(transfer.expires_at, Some(created_at.plus_days(7)));
    }

    #[test]
    fn manager_falls_back_to_default_validity() {
        let manager = PointsTransferManager::with_default_validity_days(30);
        let created_at = Timestamp::now();
        let transfer =
            manager.create_add_points_transfer(PointsTransferId::new(), points(100), created_at, None);
        assert_eq!(transfer.expires_at, Some(created_at.plus_days(30)));
    }

    #[test]
    fn manager_without_default_creates_non_expiring_credits() {
        let manager = PointsTransferManager::new();
        let transfer = manager.create_add_points_transfer(
            PointsTransferId::new(),
            points(100),
            Timestamp::now(),
            None,
        );
        assert_eq!(transfer.expires_at, None);
    }

    #[test]
    fn spend_transfer_defaults_to_strict_balance() {
        let spend = SpendPointsTransfer::new(
            PointsTransferId::new(),
            points(50),
            Timestamp::now(),
            Some(TransferComment::try_new("reward pickup").unwrap()),
        );
        assert!(!spend.allow_negative_balance);
        assert!(spend.allowing_negative_balance().allow_negative_balance);
    }
}

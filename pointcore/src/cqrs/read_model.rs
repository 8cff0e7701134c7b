//! Denormalized read models maintained by the projections.

use crate::account::events::{TransferState, TransferType};
use crate::account::types::{AccountId, CustomerId, PointsTransferId};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// One ledger entry as exposed to queries: a flat document per transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTransferDetails {
    /// The transfer's identity.
    pub points_transfer_id: PointsTransferId,
    /// The account holding it.
    pub account_id: AccountId,
    /// The owning customer, once the creation event has been projected.
    pub customer_id: Option<CustomerId>,
    /// Credit or redemption.
    pub transfer_type: TransferType,
    /// Current lifecycle state.
    pub state: TransferState,
    /// Face value in points.
    pub value: u64,
    /// Unconsumed points (credits only; zero for redemptions).
    pub remaining: u64,
    /// Operator note, for redemptions that carry one.
    pub comment: Option<String>,
    /// Business creation time.
    pub created_at: Timestamp,
    /// Expiry instant for credits; `None` means never.
    pub expires_at: Option<Timestamp>,
}

/// Per-account summary exposed to queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDetails {
    /// The account's identity.
    pub account_id: AccountId,
    /// The owning customer.
    pub customer_id: CustomerId,
    /// Cached active balance. Negative only after advance spends.
    pub points_amount: i64,
    /// Lifetime points credited, canceled credits excluded.
    pub total_earned: u64,
    /// Lifetime points redeemed, canceled redemptions excluded.
    pub total_spent: u64,
}

impl AccountDetails {
    /// A freshly created, empty account view.
    pub const fn new(account_id: AccountId, customer_id: CustomerId) -> Self {
        Self {
            account_id,
            customer_id,
            points_amount: 0,
            total_earned: 0,
            total_spent: 0,
        }
    }
}

/// One-based page window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// One-based page number.
    pub page: usize,
    /// Documents per page.
    pub per_page: usize,
}

impl Pagination {
    /// The given page with the given size (page is clamped to at least 1).
    pub const fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: if page == 0 { 1 } else { page },
            per_page,
        }
    }

    /// Index of the first document on this page.
    pub const fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }

    /// Keeps only this page of an already-sorted list.
    pub fn slice<T>(&self, mut items: Vec<T>) -> Vec<T> {
        let offset = self.offset();
        if offset >= items.len() {
            return Vec::new();
        }
        items.drain(..offset);
        items.truncate(self.per_page);
        items
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_slices_pages() {
        let items: Vec<u32> = (0..25).collect();
        assert_eq!(Pagination::new(1, 10).slice(items.clone()), (0..10).collect::<Vec<_>>());
        assert_eq!(Pagination::new(2, 10).slice(items.clone()), (10..20).collect::<Vec<_>>());
        assert_eq!(Pagination::new(3, 10).slice(items.clone()), (20..25).collect::<Vec<_>>());
        assert!(Pagination::new(4, 10).slice(items).is_empty());
    }

    #[test]
    fn pagination_clamps_page_zero() {
        assert_eq!(Pagination::new(0, 10).offset(), 0);
    }

    #[test]
    fn new_account_view_starts_empty() {
        let details = AccountDetails::new(AccountId::new(), CustomerId::new());
        assert_eq!(details.points_amount, 0);
        assert_eq!(details.total_earned, 0);
        assert_eq!(details.total_spent, 0);
    }
}

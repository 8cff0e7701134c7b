//! The account aggregate state and its decision helpers.
//!
//! `AccountState` is rebuilt by folding the account's event stream in order.
//! Folding is total and idempotent: an event for a transfer already in a
//! terminal state, or a duplicate transfer id, changes nothing. Decisions
//! (spend plans, cancel outcomes) are computed here and recorded into events
//! by the commands, never re-derived during a fold.

use crate::account::events::{
    AccountEvent, ConsumedPoints, TransferState, TransferType,
};
use crate::account::types::{AccountId, CustomerId, PointsTransferId};
use crate::types::Timestamp;
use std::collections::HashMap;

/// A credit as tracked inside the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddingEntry {
    /// Face value of the credit.
    pub value: u64,
    /// How much of it spends have consumed so far.
    pub consumed: u64,
    /// Business creation time.
    pub created_at: Timestamp,
    /// Expiry instant, `None` for never.
    pub expires_at: Option<Timestamp>,
    /// Lifecycle state.
    pub state: TransferState,
}

impl AddingEntry {
    /// Points of this credit that are still unconsumed.
    pub const fn remaining(&self) -> u64 {
        self.value.saturating_sub(self.consumed)
    }
}

/// A redemption as tracked inside the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendingEntry {
    /// Face value of the redemption.
    pub value: u64,
    /// Whether the redemption was canceled.
    pub canceled: bool,
    /// The breakdown recorded when the spend was accepted.
    pub consumed: Vec<ConsumedPoints>,
    /// Portion that was not covered by active credits.
    pub overdrawn: u64,
}

/// How the spend of a given value would be covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    /// Slices charged against specific credits, oldest-expiring first.
    pub consumed: Vec<ConsumedPoints>,
    /// Value left uncovered by any active credit.
    pub overdrawn: u64,
}

/// Outcome of evaluating a cancel request against the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelDecision {
    /// Missing target or one already expired/canceled: succeed silently.
    Noop,
    /// The transfer has been (partially) consumed and cannot be withdrawn.
    NotCancelable,
    /// Cancel an untouched credit, removing its unspent value.
    Adding {
        /// Face value of the credit.
        value: u64,
        /// Points removed from the active balance.
        voided_value: u64,
    },
    /// Cancel a redemption, re-crediting what its sources can still take.
    Spending {
        /// Face value of the redemption.
        value: u64,
        /// Slices returned to still-creditable sources.
        restored: Vec<ConsumedPoints>,
        /// Overdraft cleared along with the redemption.
        overdraft_cleared: u64,
    },
}

/// State of one loyalty account, folded from its event stream.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    account_id: Option<AccountId>,
    customer_id: Option<CustomerId>,
    adding: HashMap<PointsTransferId, AddingEntry>,
    spending: HashMap<PointsTransferId, SpendingEntry>,
    overdraft: u64,
}

impl AccountState {
    /// Whether the creation event has been seen.
    pub const fn is_created(&self) -> bool {
        self.account_id.is_some()
    }

    /// The account identity, once created.
    pub const fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    /// The owning customer, once created.
    pub const fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    /// Whether any transfer (credit or redemption) uses this id.
    pub fn has_transfer(&self, transfer_id: &PointsTransferId) -> bool {
        self.adding.contains_key(transfer_id) || self.spending.contains_key(transfer_id)
    }

    /// Looks up a credit entry.
    pub fn adding_transfer(&self, transfer_id: &PointsTransferId) -> Option<&AddingEntry> {
        self.adding.get(transfer_id)
    }

    /// Looks up a redemption entry.
    pub fn spending_transfer(&self, transfer_id: &PointsTransferId) -> Option<&SpendingEntry> {
        self.spending.get(transfer_id)
    }

    /// Points currently available to spend: the unconsumed remainder of all
    /// active credits, minus any overdraft from advance spends. Negative
    /// only when advance spending has been used.
    pub fn active_points(&self) -> i64 {
        let remaining: u64 = self
            .adding
            .values()
            .filter(|entry| entry.state == TransferState::Active)
            .map(AddingEntry::remaining)
            .sum();
        to_i64(remaining) - to_i64(self.overdraft)
    }

    /// Plans how a spend of `value` points would be covered.
    ///
    /// Credits are consumed expiring-soonest first: ascending expiry with
    /// never-expiring credits last, then ascending creation time, then
    /// ascending transfer id so the order is total and replays agree.
    pub fn plan_spend(&self, value: u64) -> SpendPlan {
        let mut order: Vec<(&PointsTransferId, &AddingEntry)> = self
            .adding
            .iter()
            .filter(|(_, entry)| entry.state == TransferState::Active && entry.remaining() > 0)
            .collect();
        order.sort_by_key(|(id, entry)| {
            (
                entry.expires_at.is_none(),
                entry.expires_at,
                entry.created_at,
                **id,
            )
        });

        let mut consumed = Vec::new();
        let mut outstanding = value;
        for (id, entry) in order {
            if outstanding == 0 {
                break;
            }
            let amount = entry.remaining().min(outstanding);
            consumed.push(ConsumedPoints {
                source: *id,
                amount,
            });
            outstanding -= amount;
        }

        SpendPlan {
            consumed,
            overdrawn: outstanding,
        }
    }

    /// The unspent value of a credit due for expiry at `now`, or `None`
    /// when expiring it would be a no-op (missing, not yet due, already
    /// terminal, or fully consumed).
    pub fn expirable_value(&self, transfer_id: &PointsTransferId, now: Timestamp) -> Option<u64> {
        let entry = self.adding.get(transfer_id)?;
        if entry.state != TransferState::Active {
            return None;
        }
        let expires_at = entry.expires_at?;
        if now < expires_at || entry.remaining() == 0 {
            return None;
        }
        Some(entry.remaining())
    }

    /// Evaluates a cancel request without mutating anything.
    pub fn decide_cancel(&self, transfer_id: &PointsTransferId) -> CancelDecision {
        if let Some(entry) = self.adding.get(transfer_id) {
            return match entry.state {
                TransferState::Active if entry.consumed == 0 => CancelDecision::Adding {
                    value: entry.value,
                    voided_value: entry.remaining(),
                },
                // any consumption pins the credit to the ledger
                TransferState::Active | TransferState::Used => CancelDecision::NotCancelable,
                TransferState::Expired | TransferState::Canceled => CancelDecision::Noop,
            };
        }
        if let Some(entry) = self.spending.get(transfer_id) {
            if entry.canceled {
                return CancelDecision::Noop;
            }
            let restored = entry
                .consumed
                .iter()
                .filter(|slice| {
                    self.adding.get(&slice.source).is_some_and(|source| {
                        matches!(source.state, TransferState::Active | TransferState::Used)
                    })
                })
                .copied()
                .collect();
            return CancelDecision::Spending {
                value: entry.value,
                restored,
                overdraft_cleared: entry.overdrawn,
            };
        }
        CancelDecision::Noop
    }

    /// Folds one event into the state.
    pub fn apply(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::AccountCreated(e) => {
                if self.account_id.is_none() {
                    self.account_id = Some(e.account_id);
                    self.customer_id = Some(e.customer_id);
                }
            }
            AccountEvent::PointsAdded(e) => {
                if !self.has_transfer(&e.transfer_id) {
                    self.adding.insert(
                        e.transfer_id,
                        AddingEntry {
                            value: e.value.into(),
                            consumed: 0,
                            created_at: e.created_at,
                            expires_at: e.expires_at,
                            state: TransferState::Active,
                        },
                    );
                }
            }
            AccountEvent::PointsSpent(e) => {
                if self.has_transfer(&e.transfer_id) {
                    return;
                }
                for slice in &e.consumed {
                    if let Some(source) = self.adding.get_mut(&slice.source) {
                        source.consumed = source
                            .consumed
                            .saturating_add(slice.amount)
                            .min(source.value);
                        if source.state == TransferState::Active && source.remaining() == 0 {
                            source.state = TransferState::Used;
                        }
                    }
                }
                self.overdraft = self.overdraft.saturating_add(e.overdrawn);
                self.spending.insert(
                    e.transfer_id,
                    SpendingEntry {
                        value: e.value.into(),
                        canceled: false,
                        consumed: e.consumed.clone(),
                        overdrawn: e.overdrawn,
                    },
                );
            }
            AccountEvent::PointsTransferExpired(e) => {
                if let Some(entry) = self.adding.get_mut(&e.transfer_id) {
                    if entry.state == TransferState::Active {
                        entry.state = TransferState::Expired;
                    }
                }
            }
            AccountEvent::PointsTransferCanceled(e) => match e.transfer_type {
                TransferType::Adding => {
                    if let Some(entry) = self.adding.get_mut(&e.transfer_id) {
                        if entry.state == TransferState::Active {
                            entry.state = TransferState::Canceled;
                        }
                    }
                }
                TransferType::Spending => {
                    let Some(entry) = self.spending.get_mut(&e.transfer_id) else {
                        return;
                    };
                    if entry.canceled {
                        return;
                    }
                    entry.canceled = true;
                    for slice in &e.restored {
                        if let Some(source) = self.adding.get_mut(&slice.source) {
                            source.consumed = source.consumed.saturating_sub(slice.amount);
                            if source.state == TransferState::Used && source.remaining() > 0 {
                                source.state = TransferState::Active;
                            }
                        }
                    }
                    self.overdraft = self.overdraft.saturating_sub(e.overdraft_cleared);
                }
            },
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

//! Projections: consumers of the event feed that maintain the read models.
//!
//! Projections apply events in feed order and are upsert-based, so replaying
//! an already-applied batch converges to the same documents.

use crate::account::events::{AccountEvent, TransferState, TransferType};
use crate::account::types::{AccountId, CustomerId, PointsTransferId};
use crate::cqrs::read_model::{AccountDetails, PointsTransferDetails};
use crate::cqrs::repository::{AccountDetailsRepository, PointsTransferDetailsRepository};
use crate::errors::{ProjectionError, ProjectionResult};
use crate::event_store::StoredEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A consumer of the ordered event feed.
#[async_trait]
pub trait Projection: Send + Sync {
    /// The event payload type consumed.
    type Event: Send + Sync;

    /// Stable name, used as the checkpoint key.
    fn name(&self) -> &str;

    /// Applies one event. Must tolerate replays of already-applied events.
    async fn apply(&self, event: &StoredEvent<Self::Event>) -> ProjectionResult<()>;
}

/// Maintains one [`PointsTransferDetails`] document per transfer.
pub struct PointsTransferDetailsProjection {
    transfers: Arc<dyn PointsTransferDetailsRepository>,
    // account -> customer, learned from creation events, so transfer
    // documents can be stamped with their owner
    customers: RwLock<HashMap<AccountId, CustomerId>>,
}

impl PointsTransferDetailsProjection {
    /// Projection writing into the given repository.
    pub fn new(transfers: Arc<dyn PointsTransferDetailsRepository>) -> Self {
        Self {
            transfers,
            customers: RwLock::new(HashMap::new()),
        }
    }

    async fn update_transfer<F>(
        &self,
        event: &StoredEvent<AccountEvent>,
        transfer_id: PointsTransferId,
        update: F,
    ) -> ProjectionResult<()>
    where
        F: FnOnce(&mut PointsTransferDetails) + Send,
    {
        let found = self
            .transfers
            .find_by_id(&transfer_id)
            .await
            .map_err(|e| storage_failure(event, &e))?;
        let Some(mut details) = found else {
            debug!(%transfer_id, "transfer document missing, skipping update");
            return Ok(());
        };
        update(&mut details);
        self.transfers
            .save(details)
            .await
            .map_err(|e| storage_failure(event, &e))
    }
}

#[async_trait]
impl Projection for PointsTransferDetailsProjection {
    type Event = AccountEvent;

    fn name(&self) -> &str {
        "points_transfer_details"
    }

    async fn apply(&self, event: &StoredEvent<Self::Event>) -> ProjectionResult<()> {
        match &event.payload {
            AccountEvent::AccountCreated(e) => {
                self.customers.write().insert(e.account_id, e.customer_id);
                Ok(())
            }
            AccountEvent::PointsAdded(e) => {
                let customer_id = self.customers.read().get(&e.account_id).copied();
                self.transfers
                    .save(PointsTransferDetails {
                        points_transfer_id: e.transfer_id,
                        account_id: e.account_id,
                        customer_id,
                        transfer_type: TransferType::Adding,
                        state: TransferState::Active,
                        value: e.value.into(),
                        remaining: e.value.into(),
                        comment: None,
                        created_at: e.created_at,
                        expires_at: e.expires_at,
                    })
                    .await
                    .map_err(|err| storage_failure(event, &err))
            }
            AccountEvent::PointsSpent(e) => {
                let customer_id = self.customers.read().get(&e.account_id).copied();
                self.transfers
                    .save(PointsTransferDetails {
                        points_transfer_id: e.transfer_id,
                        account_id: e.account_id,
                        customer_id,
                        transfer_type: TransferType::Spending,
                        state: TransferState::Active,
                        value: e.value.into(),
                        remaining: 0,
                        comment: e.comment.as_ref().map(ToString::to_string),
                        created_at: e.created_at,
                        expires_at: None,
                    })
                    .await
                    .map_err(|err| storage_failure(event, &err))?;

                for slice in &e.consumed {
                    self.update_transfer(event, slice.source, |details| {
                        details.remaining = details.remaining.saturating_sub(slice.amount);
                        if details.remaining == 0 && details.state == TransferState::Active {
                            details.state = TransferState::Used;
                        }
                    })
                    .await?;
                }
                Ok(())
            }
            AccountEvent::PointsTransferExpired(e) => {
                self.update_transfer(event, e.transfer_id, |details| {
                    if details.state == TransferState::Active {
                        details.state = TransferState::Expired;
                    }
                })
                .await
            }
            AccountEvent::PointsTransferCanceled(e) => {
                self.update_transfer(event, e.transfer_id, |details| {
                    details.state = TransferState::Canceled;
                })
                .await?;

                for slice in &e.restored {
                    self.update_transfer(event, slice.source, |details| {
                        details.remaining =
                            details.remaining.saturating_add(slice.amount).min(details.value);
                        if details.state == TransferState::Used && details.remaining > 0 {
                            details.state = TransferState::Active;
                        }
                    })
                    .await?;
                }
                Ok(())
            }
        }
    }
}

/// Maintains one [`AccountDetails`] summary per account.
pub struct AccountDetailsProjection {
    accounts: Arc<dyn AccountDetailsRepository>,
}

impl AccountDetailsProjection {
    /// Projection writing into the given repository.
    pub fn new(accounts: Arc<dyn AccountDetailsRepository>) -> Self {
        Self { accounts }
    }

    async fn update_account<F>(
        &self,
        event: &StoredEvent<AccountEvent>,
        account_id: AccountId,
        update: F,
    ) -> ProjectionResult<()>
    where
        F: FnOnce(&mut AccountDetails) + Send,
    {
        let found = self
            .accounts
            .find_by_id(&account_id)
            .await
            .map_err(|e| storage_failure(event, &e))?;
        let Some(mut details) = found else {
            debug!(%account_id, "account document missing, skipping update");
            return Ok(());
        };
        update(&mut details);
        self.accounts
            .save(details)
            .await
            .map_err(|e| storage_failure(event, &e))
    }
}

#[async_trait]
impl Projection for AccountDetailsProjection {
    type Event = AccountEvent;

    fn name(&self) -> &str {
        "account_details"
    }

    async fn apply(&self, event: &StoredEvent<Self::Event>) -> ProjectionResult<()> {
        match &event.payload {
            AccountEvent::AccountCreated(e) => self
                .accounts
                .save(AccountDetails::new(e.account_id, e.customer_id))
                .await
                .map_err(|err| storage_failure(event, &err)),
            AccountEvent::PointsAdded(e) => {
                let value: u64 = e.value.into();
                self.update_account(event, e.account_id, |details| {
                    details.points_amount += to_i64(value);
                    details.total_earned = details.total_earned.saturating_add(value);
                })
                .await
            }
            AccountEvent::PointsSpent(e) => {
                let value: u64 = e.value.into();
                self.update_account(event, e.account_id, |details| {
                    details.points_amount -= to_i64(value);
                    details.total_spent = details.total_spent.saturating_add(value);
                })
                .await
            }
            AccountEvent::PointsTransferExpired(e) => {
                self.update_account(event, e.account_id, |details| {
                    details.points_amount -= to_i64(e.unused_value);
                })
                .await
            }
            AccountEvent::PointsTransferCanceled(e) => {
                let restored_sum: u64 = e.restored.iter().map(|slice| slice.amount).sum();
                self.update_account(event, e.account_id, |details| match e.transfer_type {
                    TransferType::Adding => {
                        details.points_amount -= to_i64(e.voided_value);
                        details.total_earned = details.total_earned.saturating_sub(e.value);
                    }
                    TransferType::Spending => {
                        details.points_amount +=
                            to_i64(restored_sum) + to_i64(e.overdraft_cleared);
                        details.total_spent = details.total_spent.saturating_sub(e.value);
                    }
                })
                .await
            }
        }
    }
}

fn storage_failure(
    event: &StoredEvent<AccountEvent>,
    error: &crate::cqrs::CqrsError,
) -> ProjectionError {
    ProjectionError::EventProcessingFailed {
        event_id: event.event_id,
        reason: error.to_string(),
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::events::{
        AccountCreated, ConsumedPoints, PointsAdded, PointsSpent, PointsTransferCanceled,
        PointsTransferExpired,
    };
    use crate::account::types::{Points, PointsTransferId};
    use crate::cqrs::repository::{
        InMemoryAccountDetailsRepository, InMemoryPointsTransferDetailsRepository,
    };
    use crate::types::{EventId, EventVersion, StreamId, Timestamp};

    fn stored(event: AccountEvent) -> StoredEvent<AccountEvent> {
        StoredEvent::new(
            EventId::new(),
            StreamId::try_new("account-test").unwrap(),
            EventVersion::initial().next(),
            Timestamp::now(),
            event,
            None,
        )
    }

    fn points(v: u64) -> Points {
        Points::try_new(v).unwrap()
    }

    struct Fixture {
        transfers: Arc<InMemoryPointsTransferDetailsRepository>,
        accounts: Arc<InMemoryAccountDetailsRepository>,
        transfer_projection: PointsTransferDetailsProjection,
        account_projection: AccountDetailsProjection,
        account_id: AccountId,
    }

    impl Fixture {
        async fn new() -> Self {
            let transfers = Arc::new(InMemoryPointsTransferDetailsRepository::new());
            let accounts = Arc::new(InMemoryAccountDetailsRepository::new());
            let fixture = Self {
                transfer_projection: PointsTransferDetailsProjection::new(transfers.clone()),
                account_projection: AccountDetailsProjection::new(accounts.clone()),
                transfers,
                accounts,
                account_id: AccountId::new(),
            };
            fixture
                .apply(AccountEvent::from(AccountCreated {
                    account_id: fixture.account_id,
                    customer_id: CustomerId::new(),
                }))
                .await;
            fixture
        }

        async fn apply(&self, event: AccountEvent) {
            let event = stored(event);
            self.transfer_projection.apply(&event).await.unwrap();
            self.account_projection.apply(&event).await.unwrap();
        }

        async fn add(&self, transfer_id: PointsTransferId, value: u64) {
            self.apply(AccountEvent::from(PointsAdded {
                account_id: self.account_id,
                transfer_id,
                value: points(value),
                created_at: Timestamp::now(),
                expires_at: None,
            }))
            .await;
        }

        async fn balance(&self) -> i64 {
            self.accounts
                .find_by_id(&self.account_id)
                .await
                .unwrap()
                .unwrap()
                .points_amount
        }
    }

    #[tokio::test]
    async fn adding_projects_a_transfer_document_and_balance() {
        let fixture = Fixture::new().await;
        let credit = PointsTransferId::new();
        fixture.add(credit, 100).await;

        let details = fixture.transfers.find_by_id(&credit).await.unwrap().unwrap();
        assert_eq!(details.transfer_type, TransferType::Adding);
        assert_eq!(details.state, TransferState::Active);
        assert_eq!(details.remaining, 100);
        assert!(details.customer_id.is_some());
        assert_eq!(fixture.balance().await, 100);
    }

    #[tokio::test]
    async fn spending_consumes_sources_in_the_documents() {
        let fixture = Fixture::new().await;
        let credit = PointsTransferId::new();
        let spend = PointsTransferId::new();
        fixture.add(credit, 100).await;
        fixture
            .apply(AccountEvent::from(PointsSpent {
                account_id: fixture.account_id,
                transfer_id: spend,
                value: points(100),
                created_at: Timestamp::now(),
                comment: None,
                consumed: vec![ConsumedPoints {
                    source: credit,
                    amount: 100,
                }],
                overdrawn: 0,
            }))
            .await;

        let source = fixture.transfers.find_by_id(&credit).await.unwrap().unwrap();
        assert_eq!(source.state, TransferState::Used);
        assert_eq!(source.remaining, 0);
        assert_eq!(fixture.balance().await, 0);

        let account = fixture
            .accounts
            .find_by_id(&fixture.account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.total_spent, 100);
        assert_eq!(account.total_earned, 100);
    }

    #[tokio::test]
    async fn expiry_flips_the_document_state_and_balance() {
        let fixture = Fixture::new().await;
        let credit = PointsTransferId::new();
        fixture.add(credit, 100).await;
        fixture
            .apply(AccountEvent::from(PointsTransferExpired {
                account_id: fixture.account_id,
                transfer_id: credit,
                unused_value: 100,
            }))
            .await;

        let details = fixture.transfers.find_by_id(&credit).await.unwrap().unwrap();
        assert_eq!(details.state, TransferState::Expired);
        assert_eq!(fixture.balance().await, 0);
    }

    #[tokio::test]
    async fn cancel_of_a_spend_restores_documents() {
        let fixture = Fixture::new().await;
        let credit = PointsTransferId::new();
        let spend = PointsTransferId::new();
        fixture.add(credit, 100).await;
        fixture
            .apply(AccountEvent::from(PointsSpent {
                account_id: fixture.account_id,
                transfer_id: spend,
                value: points(100),
                created_at: Timestamp::now(),
                comment: None,
                consumed: vec![ConsumedPoints {
                    source: credit,
                    amount: 100,
                }],
                overdrawn: 0,
            }))
            .await;
        fixture
            .apply(AccountEvent::from(PointsTransferCanceled {
                account_id: fixture.account_id,
                transfer_id: spend,
                transfer_type: TransferType::Spending,
                value: 100,
                voided_value: 0,
                restored: vec![ConsumedPoints {
                    source: credit,
                    amount: 100,
                }],
                overdraft_cleared: 0,
            }))
            .await;

        let spend_doc = fixture.transfers.find_by_id(&spend).await.unwrap().unwrap();
        assert_eq!(spend_doc.state, TransferState::Canceled);
        let source = fixture.transfers.find_by_id(&credit).await.unwrap().unwrap();
        assert_eq!(source.state, TransferState::Active);
        assert_eq!(source.remaining, 100);
        assert_eq!(fixture.balance().await, 100);

        // the canceled spend no longer counts toward the aggregates
        assert_eq!(
            fixture.transfers.count_total_spending_transfers().await.unwrap(),
            0
        );
    }
}

//! Commands over the account aggregate.
//!
//! Every command here reads and writes the single `account-{id}` stream.
//! Add and spend use the transfer id as an idempotency key: a replayed id
//! produces zero events and succeeds. Expire and cancel are idempotent by
//! construction — a missing or already-terminal target is a silent no-op.

use crate::account::events::{
    AccountCreated, AccountEvent, PointsAdded, PointsSpent, PointsTransferCanceled,
    PointsTransferExpired, TransferType,
};
use crate::account::state::{AccountState, CancelDecision};
use crate::account::transfer::{AddPointsTransfer, SpendPointsTransfer};
use crate::account::types::{AccountId, CustomerId, PointsTransferId};
use crate::command::{Command, CommandResult};
use crate::errors::CommandError;
use crate::event_store::StoredEvent;
use crate::types::{StreamId, Timestamp};
use async_trait::async_trait;

/// The event stream holding one account's ledger.
pub fn account_stream(account_id: AccountId) -> StreamId {
    StreamId::try_new(format!("account-{account_id}"))
        .expect("account stream ids are non-empty and short")
}

/// Input for [`CreateAccount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccountInput {
    /// Identity of the new account.
    pub account_id: AccountId,
    /// The customer the account belongs to.
    pub customer_id: CustomerId,
}

/// Opens a loyalty account for a customer. Dispatched by the registration
/// flow before any points can move.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateAccount;

#[async_trait]
impl Command for CreateAccount {
    type Input = CreateAccountInput;
    type State = AccountState;
    type Event = AccountEvent;

    fn read_streams(&self, input: &Self::Input) -> Vec<StreamId> {
        vec![account_stream(input.account_id)]
    }

    fn apply(&self, state: &mut Self::State, stored_event: &StoredEvent<Self::Event>) {
        state.apply(&stored_event.payload);
    }

    async fn handle(
        &self,
        state: Self::State,
        input: Self::Input,
    ) -> CommandResult<Vec<(StreamId, Self::Event)>> {
        if state.is_created() {
            return Err(CommandError::AccountAlreadyExists(input.account_id));
        }
        Ok(vec![(
            account_stream(input.account_id),
            AccountEvent::from(AccountCreated {
                account_id: input.account_id,
                customer_id: input.customer_id,
            }),
        )])
    }
}

/// Input for [`AddPoints`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPointsInput {
    /// The account to credit.
    pub account_id: AccountId,
    /// The credit to record.
    pub transfer: AddPointsTransfer,
}

/// Credits points to an account.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddPoints;

#[async_trait]
impl Command for AddPoints {
    type Input = AddPointsInput;
    type State = AccountState;
    type Event = AccountEvent;

    fn read_streams(&self, input: &Self::Input) -> Vec<StreamId> {
        vec![account_stream(input.account_id)]
    }

    fn apply(&self, state: &mut Self::State, stored_event: &StoredEvent<Self::Event>) {
        state.apply(&stored_event.payload);
    }

    async fn handle(
        &self,
        state: Self::State,
        input: Self::Input,
    ) -> CommandResult<Vec<(StreamId, Self::Event)>> {
        if !state.is_created() {
            return Err(CommandError::AccountNotFound(input.account_id));
        }
        if state.has_transfer(&input.transfer.id) {
            // replayed transfer id: already applied
            return Ok(Vec::new());
        }
        Ok(vec![(
            account_stream(input.account_id),
            AccountEvent::from(PointsAdded {
                account_id: input.account_id,
                transfer_id: input.transfer.id,
                value: input.transfer.value,
                created_at: input.transfer.created_at,
                expires_at: input.transfer.expires_at,
            }),
        )])
    }
}

/// Input for [`SpendPoints`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPointsInput {
    /// The account to debit.
    pub account_id: AccountId,
    /// The redemption to record.
    pub transfer: SpendPointsTransfer,
}

/// Redeems points from an account, consuming active credits
/// expiring-soonest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpendPoints;

#[async_trait]
impl Command for SpendPoints {
    type Input = SpendPointsInput;
    type State = AccountState;
    type Event = AccountEvent;

    fn read_streams(&self, input: &Self::Input) -> Vec<StreamId> {
        vec![account_stream(input.account_id)]
    }

    fn apply(&self, state: &mut Self::State, stored_event: &StoredEvent<Self::Event>) {
        state.apply(&stored_event.payload);
    }

    async fn handle(
        &self,
        state: Self::State,
        input: Self::Input,
    ) -> CommandResult<Vec<(StreamId, Self::Event)>> {
        if !state.is_created() {
            return Err(CommandError::AccountNotFound(input.account_id));
        }
        if state.has_transfer(&input.transfer.id) {
            return Ok(Vec::new());
        }

        let requested: u64 = input.transfer.value.into();
        let available = state.active_points();
        if !input.transfer.allow_negative_balance
            && i64::try_from(requested).unwrap_or(i64::MAX) > available
        {
            return Err(CommandError::InsufficientPoints {
                available,
                requested,
            });
        }

        let plan = state.plan_spend(requested);
        Ok(vec![(
            account_stream(input.account_id),
            AccountEvent::from(PointsSpent {
                account_id: input.account_id,
                transfer_id: input.transfer.id,
                value: input.transfer.value,
                created_at: input.transfer.created_at,
                comment: input.transfer.comment,
                consumed: plan.consumed,
                overdrawn: plan.overdrawn,
            }),
        )])
    }
}

/// Input for [`ExpirePointsTransfer`]. The evaluation instant is supplied
/// by the caller (the scheduler), keeping the decision replayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirePointsTransferInput {
    /// The account holding the credit.
    pub account_id: AccountId,
    /// The credit to expire.
    pub transfer_id: PointsTransferId,
    /// The instant the expiry is evaluated against.
    pub now: Timestamp,
}

/// Expires an adding transfer whose validity window has closed.
///
/// Idempotent: a missing account, a missing transfer, one not yet due, or
/// one already used/expired/canceled all succeed without emitting anything,
/// so the scheduler may dispatch duplicates against a stale projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirePointsTransfer;

#[async_trait]
impl Command for ExpirePointsTransfer {
    type Input = ExpirePointsTransferInput;
    type State = AccountState;
    type Event = AccountEvent;

    fn read_streams(&self, input: &Self::Input) -> Vec<StreamId> {
        vec![account_stream(input.account_id)]
    }

    fn apply(&self, state: &mut Self::State, stored_event: &StoredEvent<Self::Event>) {
        state.apply(&stored_event.payload);
    }

    async fn handle(
        &self,
        state: Self::State,
        input: Self::Input,
    ) -> CommandResult<Vec<(StreamId, Self::Event)>> {
        let Some(unused_value) = state.expirable_value(&input.transfer_id, input.now) else {
            return Ok(Vec::new());
        };
        Ok(vec![(
            account_stream(input.account_id),
            AccountEvent::from(PointsTransferExpired {
                account_id: input.account_id,
                transfer_id: input.transfer_id,
                unused_value,
            }),
        )])
    }
}

/// Input for [`CancelPointsTransfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelPointsTransferInput {
    /// The account holding the transfer.
    pub account_id: AccountId,
    /// The transfer to withdraw.
    pub transfer_id: PointsTransferId,
}

/// Withdraws a transfer from the ledger.
///
/// An untouched credit is voided; a redemption is canceled and its
/// consumption returned to whichever source credits can still take it.
/// Missing or already expired/canceled targets are silent no-ops; a credit
/// that spends have touched is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelPointsTransfer;

#[async_trait]
impl Command for CancelPointsTransfer {
    type Input = CancelPointsTransferInput;
    type State = AccountState;
    type Event = AccountEvent;

    fn read_streams(&self, input: &Self::Input) -> Vec<StreamId> {
        vec![account_stream(input.account_id)]
    }

    fn apply(&self, state: &mut Self::State, stored_event: &StoredEvent<Self::Event>) {
        state.apply(&stored_event.payload);
    }

    async fn handle(
        &self,
        state: Self::State,
        input: Self::Input,
    ) -> CommandResult<Vec<(StreamId, Self::Event)>> {
        let event = match state.decide_cancel(&input.transfer_id) {
            CancelDecision::Noop => return Ok(Vec::new()),
            CancelDecision::NotCancelable => {
                return Err(CommandError::TransferNotCancelable(input.transfer_id));
            }
            CancelDecision::Adding {
                value,
                voided_value,
            } => PointsTransferCanceled {
                account_id: input.account_id,
                transfer_id: input.transfer_id,
                transfer_type: TransferType::Adding,
                value,
                voided_value,
                restored: Vec::new(),
                overdraft_cleared: 0,
            },
            CancelDecision::Spending {
                value,
                restored,
                overdraft_cleared,
            } => PointsTransferCanceled {
                account_id: input.account_id,
                transfer_id: input.transfer_id,
                transfer_type: TransferType::Spending,
                value,
                voided_value: 0,
                restored,
                overdraft_cleared,
            },
        };
        Ok(vec![(
            account_stream(input.account_id),
            AccountEvent::from(event),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::Points;

    fn points(v: u64) -> Points {
        Points::try_new(v).unwrap()
    }

    fn created_state(account_id: AccountId) -> AccountState {
        let mut state = AccountState::default();
        state.apply(&AccountEvent::from(AccountCreated {
            account_id,
            customer_id: CustomerId::new(),
        }));
        state
    }

    fn state_with_credit(
        account_id: AccountId,
        transfer_id: PointsTransferId,
        value: u64,
        expires_at: Option<Timestamp>,
    ) -> AccountState {
        let mut state = created_state(account_id);
        state.apply(&AccountEvent::from(PointsAdded {
            account_id,
            transfer_id,
            value: points(value),
            created_at: Timestamp::now(),
            expires_at,
        }));
        state
    }

    #[tokio::test]
    async fn create_account_rejects_duplicates() {
        let account_id = AccountId::new();
        let input = CreateAccountInput {
            account_id,
            customer_id: CustomerId::new(),
        };

        let events = CreateAccount
            .handle(AccountState::default(), input.clone())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        let result = CreateAccount.handle(created_state(account_id), input).await;
        assert!(matches!(
            result,
            Err(CommandError::AccountAlreadyExists(id)) if id == account_id
        ));
    }

    #[tokio::test]
    async fn add_points_requires_an_account() {
        let account_id = AccountId::new();
        let input = AddPointsInput {
            account_id,
            transfer: AddPointsTransfer::new(
                PointsTransferId::new(),
                points(100),
                Timestamp::now(),
                None,
            )
            .unwrap(),
        };
        let result = AddPoints.handle(AccountState::default(), input).await;
        assert!(matches!(result, Err(CommandError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn add_points_is_idempotent_per_transfer_id() {
        let account_id = AccountId::new();
        let transfer_id = PointsTransferId::new();
        let input = AddPointsInput {
            account_id,
            transfer: AddPointsTransfer::new(transfer_id, points(100), Timestamp::now(), None)
                .unwrap(),
        };

        let state = state_with_credit(account_id, transfer_id, 100, None);
        let events = AddPoints.handle(state, input).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn spend_rejects_insufficient_balance_without_side_effects() {
        let account_id = AccountId::new();
        let state = state_with_credit(account_id, PointsTransferId::new(), 100, None);
        let input = SpendPointsInput {
            account_id,
            transfer: SpendPointsTransfer::new(
                PointsTransferId::new(),
                points(150),
                Timestamp::now(),
                None,
            ),
        };

        let result = SpendPoints.handle(state, input).await;
        assert!(matches!(
            result,
            Err(CommandError::InsufficientPoints {
                available: 100,
                requested: 150,
            })
        ));
    }

    #[tokio::test]
    async fn spend_records_the_consumption_breakdown() {
        let account_id = AccountId::new();
        let credit = PointsTransferId::new();
        let state = state_with_credit(account_id, credit, 100, None);
        let input = SpendPointsInput {
            account_id,
            transfer: SpendPointsTransfer::new(
                PointsTransferId::new(),
                points(60),
                Timestamp::now(),
                None,
            ),
        };

        let events = SpendPoints.handle(state, input).await.unwrap();
        let (_, AccountEvent::PointsSpent(spent)) = &events[0] else {
            panic!("expected a PointsSpent event");
        };
        assert_eq!(spent.consumed.len(), 1);
        assert_eq!(spent.consumed[0].source, credit);
        assert_eq!(spent.consumed[0].amount, 60);
        assert_eq!(spent.overdrawn, 0);
    }

    #[tokio::test]
    async fn advance_spend_is_accepted_when_flagged() {
        let account_id = AccountId::new();
        let state = state_with_credit(account_id, PointsTransferId::new(), 30, None);
        let input = SpendPointsInput {
            account_id,
            transfer: SpendPointsTransfer::new(
                PointsTransferId::new(),
                points(100),
                Timestamp::now(),
                None,
            )
            .allowing_negative_balance(),
        };

        let events = SpendPoints.handle(state, input).await.unwrap();
        let (_, AccountEvent::PointsSpent(spent)) = &events[0] else {
            panic!("expected a PointsSpent event");
        };
        assert_eq!(spent.overdrawn, 70);
    }

    #[tokio::test]
    async fn expire_is_a_noop_on_unknown_targets() {
        let input = ExpirePointsTransferInput {
            account_id: AccountId::new(),
            transfer_id: PointsTransferId::new(),
            now: Timestamp::now(),
        };
        let events = ExpirePointsTransfer
            .handle(AccountState::default(), input)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn expire_emits_the_unused_remainder() {
        let account_id = AccountId::new();
        let credit = PointsTransferId::new();
        let now = Timestamp::now();
        let state = state_with_credit(account_id, credit, 100, Some(now));

        let input = ExpirePointsTransferInput {
            account_id,
            transfer_id: credit,
            now,
        };
        let events = ExpirePointsTransfer.handle(state, input).await.unwrap();
        let (_, AccountEvent::PointsTransferExpired(expired)) = &events[0] else {
            panic!("expected a PointsTransferExpired event");
        };
        assert_eq!(expired.unused_value, 100);
    }

    #[tokio::test]
    async fn cancel_rejects_consumed_credits() {
        let account_id = AccountId::new();
        let credit = PointsTransferId::new();
        let mut state = state_with_credit(account_id, credit, 100, None);
        let plan = state.plan_spend(40);
        state.apply(&AccountEvent::from(PointsSpent {
            account_id,
            transfer_id: PointsTransferId::new(),
            value: points(40),
            created_at: Timestamp::now(),
            comment: None,
            consumed: plan.consumed,
            overdrawn: plan.overdrawn,
        }));

        let result = CancelPointsTransfer
            .handle(
                state,
                CancelPointsTransferInput {
                    account_id,
                    transfer_id: credit,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(CommandError::TransferNotCancelable(id)) if id == credit
        ));
    }

    #[tokio::test]
    async fn cancel_of_missing_transfer_is_a_noop() {
        let account_id = AccountId::new();
        let events = CancelPointsTransfer
            .handle(
                created_state(account_id),
                CancelPointsTransferInput {
                    account_id,
                    transfer_id: PointsTransferId::new(),
                },
            )
            .await
            .unwrap();
        assert!(events.is_empty());
    }
}

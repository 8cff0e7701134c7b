//! Background expiry of adding transfers.
//!
//! The scheduler scans the read model for active credits whose validity
//! window has closed and dispatches an expire command for each. It runs
//! against an eventually-consistent projection on purpose: the aggregate's
//! expire operation is idempotent, so a stale scan at worst dispatches
//! no-ops. One failing dispatch never aborts the rest of the batch.

use crate::account::commands::{ExpirePointsTransfer, ExpirePointsTransferInput};
use crate::account::events::AccountEvent;
use crate::account::types::{AccountId, PointsTransferId};
use crate::cqrs::{Pagination, PointsTransferDetailsRepository};
use crate::event_store::EventStore;
use crate::executor::{CommandExecutor, ExecutionContext};
use crate::types::Timestamp;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

/// Tuning for the expiry scan.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Transfers fetched per repository page.
    pub page_size: usize,
    /// Delay between scans in [`ExpiryScheduler::run`].
    pub interval: Duration,
    /// How many accounts are expired concurrently. Transfers belonging to
    /// one account are always dispatched sequentially, so concurrent
    /// dispatches never contend on a stream version.
    pub max_concurrent_accounts: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            interval: Duration::from_secs(300),
            max_concurrent_accounts: 8,
        }
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryRunSummary {
    /// Transfers the scan returned.
    pub scanned: usize,
    /// Dispatches that actually expired a transfer.
    pub expired: usize,
    /// Dispatches that were no-ops (already expired, consumed, or gone —
    /// usually projection lag).
    pub skipped: usize,
    /// Dispatches that failed; they stay due and the next scan retries.
    pub failed: usize,
}

/// Periodically expires due adding transfers.
pub struct ExpiryScheduler<ES>
where
    ES: EventStore<Event = AccountEvent>,
{
    executor: Arc<CommandExecutor<ES>>,
    transfers: Arc<dyn PointsTransferDetailsRepository>,
    config: SchedulerConfig,
}

impl<ES> ExpiryScheduler<ES>
where
    ES: EventStore<Event = AccountEvent>,
{
    /// Scheduler dispatching through the given executor, scanning the given
    /// repository.
    pub fn new(
        executor: Arc<CommandExecutor<ES>>,
        transfers: Arc<dyn PointsTransferDetailsRepository>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            transfers,
            config,
        }
    }

    /// Runs one scan: every active credit with `expires_at < now` gets an
    /// expire command dispatched on its account.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn run_once(&self, now: Timestamp) -> ExpiryRunSummary {
        let mut due: HashMap<AccountId, Vec<PointsTransferId>> = HashMap::new();
        let mut scanned = 0;
        let mut page = 1;
        loop {
            let pagination = Pagination::new(page, self.config.page_size);
            let batch = match self
                .transfers
                .find_all_active_adding_transfers_expiring_before(now, pagination)
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    error!(error = %err, page, "expiry scan query failed");
                    break;
                }
            };
            let batch_len = batch.len();
            scanned += batch_len;
            for details in batch {
                due.entry(details.account_id)
                    .or_default()
                    .push(details.points_transfer_id);
            }
            if batch_len < self.config.page_size {
                break;
            }
            page += 1;
        }

        let per_account = stream::iter(due)
            .map(|(account_id, transfer_ids)| self.expire_account(account_id, transfer_ids, now))
            .buffer_unordered(self.config.max_concurrent_accounts.max(1))
            .collect::<Vec<ExpiryRunSummary>>()
            .await;

        let mut summary = per_account
            .into_iter()
            .fold(ExpiryRunSummary::default(), |mut acc, partial| {
                acc.expired += partial.expired;
                acc.skipped += partial.skipped;
                acc.failed += partial.failed;
                acc
            });
        summary.scanned = scanned;

        if summary.scanned > 0 {
            info!(
                scanned = summary.scanned,
                expired = summary.expired,
                skipped = summary.skipped,
                failed = summary.failed,
                "expiry scan finished"
            );
        }
        summary
    }

    /// Scans on the configured interval until the shutdown signal fires.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("expiry scheduler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_once(Timestamp::now()).await;
                }
            }
        }
    }

    async fn expire_account(
        &self,
        account_id: AccountId,
        transfer_ids: Vec<PointsTransferId>,
        now: Timestamp,
    ) -> ExpiryRunSummary {
        let mut summary = ExpiryRunSummary::default();
        let context = ExecutionContext::new();
        for transfer_id in transfer_ids {
            let input = ExpirePointsTransferInput {
                account_id,
                transfer_id,
                now,
            };
            match self
                .executor
                .execute_with_retry(&ExpirePointsTransfer, input, &context)
                .await
            {
                Ok(outcome) if outcome.is_noop() => {
                    debug!(%account_id, %transfer_id, "transfer already settled, skipping");
                    summary.skipped += 1;
                }
                Ok(_) => summary.expired += 1,
                Err(err) => {
                    // leave it for the next scan
                    warn!(%account_id, %transfer_id, error = %err, "expire dispatch failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

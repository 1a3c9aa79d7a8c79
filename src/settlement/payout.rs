// Two-phase payout of unpaid payins.
//
// A payout is first committed on the output gate, which binds this keeper
// to it and opens the dispute window. Funds move only once the contract's
// freezing time has passed since the commit.

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PayoutError;
use crate::ledger::models::GateTx;
use crate::ledger::LedgerGateway;
use crate::settlement::dispatcher::TxHandler;
use crate::settlement::freezing::FreezingTimeCache;

/// How a successful payout was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutOutcome {
    /// Committed and paid within this attempt
    Paid,
    /// Found our own earlier commit and finished it
    Resumed,
}

/// Returns how much of `delay` is still left for a payin mined at `block_timestamp`.
///
/// The delay counts as elapsed once `now - block_timestamp >= delay`.
pub fn remaining_delay(block_timestamp: DateTime<Utc>, now: DateTime<Utc>, delay: Duration) -> Option<Duration> {
    match (now - block_timestamp).to_std() {
        Ok(elapsed) if elapsed >= delay => None,
        Ok(elapsed) => Some(delay - elapsed),
        // Block stamped in the future
        Err(_) => Some(delay + (block_timestamp - now).to_std().unwrap_or(Duration::ZERO)),
    }
}

pub struct PayoutExecutor {
    input: Arc<dyn LedgerGateway>,
    output: Arc<dyn LedgerGateway>,
    keeper: Address,
    delay: Duration,
    freezing: Arc<FreezingTimeCache>,
}

impl PayoutExecutor {
    pub fn new(
        input: Arc<dyn LedgerGateway>,
        output: Arc<dyn LedgerGateway>,
        keeper: Address,
        delay: Duration,
        freezing: Arc<FreezingTimeCache>,
    ) -> Self {
        Self {
            input,
            output,
            keeper,
            delay,
            freezing,
        }
    }

    /// Pays out one unpaid payin.
    ///
    /// Commit always precedes the freezing-time wait, which always precedes
    /// the payout. A payout this keeper already committed to is resumed
    /// instead of committed again.
    pub async fn process_unpaid(
        &self,
        tx: &GateTx,
        shutdown: &CancellationToken,
    ) -> Result<PayoutOutcome, PayoutError> {
        self.check_delay(tx).await?;

        let state = self
            .output
            .get_transaction_state(tx)
            .await
            .map_err(PayoutError::Lookup)?;

        if state.paid {
            return Err(PayoutError::AlreadyPaid);
        }

        if let Some(commit_ts) = state.commit_ts {
            if state.keeper != self.keeper {
                return Err(PayoutError::CommittedByOtherKeeper(state.keeper));
            }

            let freezing_time = self.freezing.get();
            let wait = match state.quarantine_ends_at(freezing_time) {
                Some(ends_at) => (ends_at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
                // Window end is past the calendar range; wait the whole freezing time
                None => freezing_time,
            };
            debug!(
                key = %tx.key(),
                commit_ts = %commit_ts,
                wait_secs = wait.as_secs(),
                "resuming committed payout"
            );

            self.wait_freezing(wait, shutdown).await?;
            self.execute(tx).await?;
            return Ok(PayoutOutcome::Resumed);
        }

        // Freezing time is taken at commit; later refreshes do not shorten this wait
        let freezing_time = self.freezing.get();
        self.output
            .commit_payout(self.keeper, tx)
            .await
            .map_err(PayoutError::Commit)?;

        info!(
            from = %tx.from,
            value = %tx.value,
            number = %tx.number,
            freezing_time_secs = freezing_time.as_secs(),
            "transaction committed"
        );

        self.wait_freezing(freezing_time, shutdown).await?;
        self.execute(tx).await?;
        Ok(PayoutOutcome::Paid)
    }

    async fn check_delay(&self, tx: &GateTx) -> Result<(), PayoutError> {
        let secs = self
            .input
            .get_block_timestamp(tx.block_number)
            .await
            .map_err(PayoutError::Lookup)?;
        let block_timestamp = DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);

        match remaining_delay(block_timestamp, Utc::now(), self.delay) {
            None => Ok(()),
            Some(remaining) => Err(PayoutError::DelayNotElapsed { remaining }),
        }
    }

    async fn wait_freezing(&self, wait: Duration, shutdown: &CancellationToken) -> Result<(), PayoutError> {
        if wait.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = shutdown.cancelled() => Err(PayoutError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    async fn execute(&self, tx: &GateTx) -> Result<(), PayoutError> {
        self.output
            .payout(self.keeper, tx)
            .await
            .map_err(PayoutError::Execute)?;

        info!(
            from = %tx.from,
            value = %tx.value,
            number = %tx.number,
            "transaction paid out"
        );
        Ok(())
    }
}

#[async_trait]
impl TxHandler for PayoutExecutor {
    async fn handle(&self, tx: &GateTx, shutdown: &CancellationToken) {
        match self.process_unpaid(tx, shutdown).await {
            Ok(outcome) => debug!(key = %tx.key(), ?outcome, "payout finished"),
            Err(e) if e.is_expected() => debug!(key = %tx.key(), "payout skipped: {}", e),
            Err(e) => warn!(key = %tx.key(), "failed to process unpaid transaction: {}", e),
        }
    }
}

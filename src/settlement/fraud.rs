use alloy_primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FraudError;
use crate::ledger::models::GateTx;
use crate::ledger::LedgerGateway;
use crate::settlement::dispatcher::TxHandler;

/// Freezes keepers responsible for payouts that have no matching payin
pub struct FraudDetector {
    output: Arc<dyn LedgerGateway>,
    keeper: Address,
}

impl FraudDetector {
    pub fn new(output: Arc<dyn LedgerGateway>, keeper: Address) -> Self {
        Self { output, keeper }
    }

    /// Freezes the keeper bound to a scummy payout. Returns the frozen keeper.
    pub async fn process_scummy(&self, tx: &GateTx) -> Result<Address, FraudError> {
        let state = self
            .output
            .get_transaction_state(tx)
            .await
            .map_err(FraudError::Lookup)?;

        let keeper = self
            .output
            .get_keeper(state.keeper)
            .await
            .map_err(FraudError::Lookup)?;

        info!(
            from = %tx.from,
            value = %tx.value,
            number = %tx.number,
            block_number = tx.block_number,
            commit_ts = ?state.commit_ts,
            paid = state.paid,
            keeper = %keeper.address,
            keeper_frozen = keeper.frozen,
            "found scummy transaction"
        );

        if keeper.frozen {
            return Err(FraudError::KeeperAlreadyFrozen(keeper.address));
        }

        self.output
            .freeze_keeper(self.keeper, state.keeper)
            .await
            .map_err(FraudError::Freeze)?;

        warn!(keeper = %state.keeper, "keeper frozen");
        Ok(state.keeper)
    }
}

#[async_trait]
impl TxHandler for FraudDetector {
    async fn handle(&self, tx: &GateTx, _shutdown: &CancellationToken) {
        match self.process_scummy(tx).await {
            Ok(_) => {}
            Err(e) if e.is_expected() => debug!(key = %tx.key(), "{}", e),
            Err(e) => warn!(key = %tx.key(), "failed to process scummy transaction: {}", e),
        }
    }
}

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::LedgerError;
use crate::ledger::models::{Chain, GateTx, Keeper, TransactionState, TxMap};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Access to the gate contract of one chain.
///
/// Write operations take the keeper account they are sent from; signing is
/// done by the ledger-access service that holds the keeper's key.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Chain this gateway talks to
    fn chain(&self) -> Chain;

    async fn get_payin_transactions(&self) -> LedgerResult<TxMap>;

    async fn get_payout_transactions(&self) -> LedgerResult<TxMap>;

    async fn get_transaction_state(&self, tx: &GateTx) -> LedgerResult<TransactionState>;

    /// First phase of a payout: binds `signer` to the transfer
    async fn commit_payout(&self, signer: Address, tx: &GateTx) -> LedgerResult<()>;

    /// Second phase of a payout, valid once the freezing time has passed
    async fn payout(&self, signer: Address, tx: &GateTx) -> LedgerResult<()>;

    async fn get_keeper(&self, address: Address) -> LedgerResult<Keeper>;

    async fn freeze_keeper(&self, signer: Address, keeper: Address) -> LedgerResult<()>;

    /// Current freezing time in seconds, as stored by the contract
    async fn get_freezing_time(&self) -> LedgerResult<U256>;

    /// Unix timestamp (seconds) of the given block
    async fn get_block_timestamp(&self, block_number: u64) -> LedgerResult<i64>;
}

/// The two gates used by one gatekeeper instance.
///
/// Payins are read from `input`, payouts are read from and made on `output`.
#[derive(Clone)]
pub struct GatewayPair {
    pub input: Arc<dyn LedgerGateway>,
    pub output: Arc<dyn LedgerGateway>,
}

impl GatewayPair {
    /// Wires the gates for a gatekeeper paying out on `direction`.
    ///
    /// A masterchain gatekeeper watches sidechain payins and pays out on the
    /// masterchain, and the other way around.
    pub fn for_direction(
        direction: Chain,
        masterchain: Arc<dyn LedgerGateway>,
        sidechain: Arc<dyn LedgerGateway>,
    ) -> Self {
        match direction {
            Chain::Masterchain => Self {
                input: sidechain,
                output: masterchain,
            },
            Chain::Sidechain => Self {
                input: masterchain,
                output: sidechain,
            },
        }
    }
}

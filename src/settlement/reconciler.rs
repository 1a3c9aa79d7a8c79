use tracing::info;

use crate::error::LedgerError;
use crate::ledger::models::{GateTx, TxMap};
use crate::ledger::GatewayPair;

/// Result of diffing one side of the bridge against the other
#[derive(Debug, Default, Clone)]
pub struct Reconciliation {
    /// Payins without a matching payout yet
    pub unpaid: Vec<GateTx>,
    /// Payouts without a matching payin
    pub scummy: Vec<GateTx>,
}

/// Partitions both transaction sets by transfer identity.
///
/// Keys present on both sides are matched and appear in neither output.
/// Outputs are sorted by key so passes are processed in a stable order.
pub fn reconcile(in_txs: &TxMap, out_txs: &TxMap) -> Reconciliation {
    let mut unpaid: Vec<GateTx> = in_txs
        .iter()
        .filter(|(key, _)| !out_txs.contains_key(key))
        .map(|(_, tx)| tx.clone())
        .collect();

    let mut scummy: Vec<GateTx> = out_txs
        .iter()
        .filter(|(key, _)| !in_txs.contains_key(key))
        .map(|(_, tx)| tx.clone())
        .collect();

    unpaid.sort_by_key(|tx| tx.key());
    scummy.sort_by_key(|tx| tx.key());

    Reconciliation { unpaid, scummy }
}

/// Loads payins from the input gate and payouts from the output gate.
///
/// Fails as a whole if either side fails; a half-loaded snapshot is never returned.
pub async fn load_transactions(gates: &GatewayPair) -> Result<(TxMap, TxMap), LedgerError> {
    let (in_txs, out_txs) = tokio::try_join!(
        gates.input.get_payin_transactions(),
        gates.output.get_payout_transactions(),
    )?;

    info!(
        payins = in_txs.len(),
        payouts = out_txs.len(),
        "loaded transactions"
    );

    Ok((in_txs, out_txs))
}

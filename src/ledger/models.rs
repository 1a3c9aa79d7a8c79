use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The two ledgers bridged by the gatekeeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Masterchain,
    Sidechain,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Masterchain => "masterchain",
            Chain::Sidechain => "sidechain",
        }
    }

    /// The chain on the other side of the bridge
    pub fn opposite(&self) -> Chain {
        match self {
            Chain::Masterchain => Chain::Sidechain,
            Chain::Sidechain => Chain::Masterchain,
        }
    }
}

/// A single payin or payout event as read from a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateTx {
    pub from: Address,
    pub value: U256,
    /// Per-sender transfer sequence number
    pub number: U256,
    pub block_number: u64,
}

impl GateTx {
    pub fn key(&self) -> TransactionKey {
        TransactionKey {
            from: self.from,
            value: self.value,
            number: self.number,
        }
    }
}

/// Identity of a logical transfer across both chains.
///
/// A payin and a payout with equal keys are the two halves of the same
/// transfer. The bridge contracts guarantee uniqueness per `(from, number)`;
/// nothing here checks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionKey {
    pub from: Address,
    pub value: U256,
    pub number: U256,
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.from, self.value, self.number)
    }
}

/// Transactions of one side of the bridge, indexed by transfer identity
pub type TxMap = HashMap<TransactionKey, GateTx>;

/// Builds a [`TxMap`] from a list of events. Later duplicates win.
pub fn index_transactions(txs: impl IntoIterator<Item = GateTx>) -> TxMap {
    txs.into_iter().map(|tx| (tx.key(), tx)).collect()
}

/// On-chain lifecycle record of a payout on the "out" ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionState {
    /// `None` while nobody has committed to this payout
    pub commit_ts: Option<DateTime<Utc>>,
    pub keeper: Address,
    pub paid: bool,
}

impl TransactionState {
    /// When the dispute window of a committed payout closes
    pub fn quarantine_ends_at(&self, freezing_time: std::time::Duration) -> Option<DateTime<Utc>> {
        let freezing = chrono::Duration::from_std(freezing_time).ok()?;
        self.commit_ts.and_then(|ts| ts.checked_add_signed(freezing))
    }
}

/// Bridge operator account. Freezing is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keeper {
    pub address: Address,
    /// Zero for accounts that were never registered as keepers
    pub day_limit: U256,
    pub frozen: bool,
}

impl Keeper {
    pub fn is_registered(&self) -> bool {
        !self.day_limit.is_zero()
    }
}

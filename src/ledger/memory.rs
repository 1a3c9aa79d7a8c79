// In-memory gate used by the engine tests.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::LedgerError;
use crate::ledger::gateway::{LedgerGateway, LedgerResult};
use crate::ledger::models::{Chain, GateTx, Keeper, TransactionKey, TransactionState, TxMap};

/// Write operation observed by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    CommitPayout(TransactionKey),
    Payout(TransactionKey),
    FreezeKeeper(Address),
}

#[derive(Default)]
struct LedgerState {
    payins: TxMap,
    payouts: TxMap,
    states: HashMap<TransactionKey, TransactionState>,
    keepers: HashMap<Address, Keeper>,
    freezing_time: U256,
    block_timestamps: HashMap<u64, i64>,
    failing: HashSet<&'static str>,
    calls: Vec<(Instant, LedgerCall)>,
    payin_load_delay: Duration,
    payin_loads: usize,
    active_payin_loads: usize,
    max_active_payin_loads: usize,
}

/// Scriptable gate contract. A successful `payout` also records the
/// matching payout event, like the real contract does.
pub struct InMemoryLedger {
    chain: Chain,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn add_payin(&self, tx: GateTx) {
        self.state.lock().payins.insert(tx.key(), tx);
    }

    pub fn add_payout(&self, tx: GateTx) {
        self.state.lock().payouts.insert(tx.key(), tx);
    }

    pub fn set_state(&self, key: TransactionKey, state: TransactionState) {
        self.state.lock().states.insert(key, state);
    }

    pub fn set_keeper(&self, keeper: Keeper) {
        self.state.lock().keepers.insert(keeper.address, keeper);
    }

    pub fn keeper(&self, address: Address) -> Option<Keeper> {
        self.state.lock().keepers.get(&address).cloned()
    }

    pub fn set_freezing_time(&self, secs: U256) {
        self.state.lock().freezing_time = secs;
    }

    pub fn set_block_timestamp(&self, block_number: u64, timestamp: i64) {
        self.state.lock().block_timestamps.insert(block_number, timestamp);
    }

    /// Makes every later call to `method` fail with an RPC error
    pub fn fail(&self, method: &'static str) {
        self.state.lock().failing.insert(method);
    }

    /// Makes every later payin listing take `delay` to answer
    pub fn set_payin_load_delay(&self, delay: Duration) {
        self.state.lock().payin_load_delay = delay;
    }

    /// Number of payin listings started, and the most that ever ran at once
    pub fn payin_loads(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.payin_loads, state.max_active_payin_loads)
    }

    pub fn calls(&self) -> Vec<(Instant, LedgerCall)> {
        self.state.lock().calls.clone()
    }

    fn check(&self, state: &LedgerState, method: &'static str) -> LedgerResult<()> {
        if state.failing.contains(method) {
            return Err(LedgerError::Rpc {
                chain: self.chain,
                code: -32000,
                message: format!("{} failed", method),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_payin_transactions(&self) -> LedgerResult<TxMap> {
        let delay = {
            let mut state = self.state.lock();
            state.payin_loads += 1;
            state.active_payin_loads += 1;
            state.max_active_payin_loads = state.max_active_payin_loads.max(state.active_payin_loads);
            state.payin_load_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.active_payin_loads -= 1;
        self.check(&state, "get_payin_transactions")?;
        Ok(state.payins.clone())
    }

    async fn get_payout_transactions(&self) -> LedgerResult<TxMap> {
        let state = self.state.lock();
        self.check(&state, "get_payout_transactions")?;
        Ok(state.payouts.clone())
    }

    async fn get_transaction_state(&self, tx: &GateTx) -> LedgerResult<TransactionState> {
        let state = self.state.lock();
        self.check(&state, "get_transaction_state")?;
        Ok(state.states.get(&tx.key()).cloned().unwrap_or(TransactionState {
            commit_ts: None,
            keeper: Address::ZERO,
            paid: false,
        }))
    }

    async fn commit_payout(&self, signer: Address, tx: &GateTx) -> LedgerResult<()> {
        let mut state = self.state.lock();
        self.check(&state, "commit_payout")?;
        state.states.insert(
            tx.key(),
            TransactionState {
                commit_ts: Some(Utc::now()),
                keeper: signer,
                paid: false,
            },
        );
        state.calls.push((Instant::now(), LedgerCall::CommitPayout(tx.key())));
        Ok(())
    }

    async fn payout(&self, signer: Address, tx: &GateTx) -> LedgerResult<()> {
        let mut state = self.state.lock();
        self.check(&state, "payout")?;
        let entry = state.states.entry(tx.key()).or_insert(TransactionState {
            commit_ts: None,
            keeper: signer,
            paid: false,
        });
        entry.paid = true;
        state.payouts.insert(tx.key(), tx.clone());
        state.calls.push((Instant::now(), LedgerCall::Payout(tx.key())));
        Ok(())
    }

    async fn get_keeper(&self, address: Address) -> LedgerResult<Keeper> {
        let state = self.state.lock();
        self.check(&state, "get_keeper")?;
        Ok(state.keepers.get(&address).cloned().unwrap_or(Keeper {
            address,
            day_limit: U256::ZERO,
            frozen: false,
        }))
    }

    async fn freeze_keeper(&self, _signer: Address, keeper: Address) -> LedgerResult<()> {
        let mut state = self.state.lock();
        self.check(&state, "freeze_keeper")?;
        state
            .keepers
            .entry(keeper)
            .or_insert(Keeper {
                address: keeper,
                day_limit: U256::ZERO,
                frozen: false,
            })
            .frozen = true;
        state.calls.push((Instant::now(), LedgerCall::FreezeKeeper(keeper)));
        Ok(())
    }

    async fn get_freezing_time(&self) -> LedgerResult<U256> {
        let state = self.state.lock();
        self.check(&state, "get_freezing_time")?;
        Ok(state.freezing_time)
    }

    async fn get_block_timestamp(&self, block_number: u64) -> LedgerResult<i64> {
        let state = self.state.lock();
        self.check(&state, "get_block_timestamp")?;
        state
            .block_timestamps
            .get(&block_number)
            .copied()
            .ok_or_else(|| LedgerError::Rpc {
                chain: self.chain,
                code: -32001,
                message: format!("unknown block {}", block_number),
            })
    }
}

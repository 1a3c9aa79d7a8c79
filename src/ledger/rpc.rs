// JSON-RPC client for the ledger-access service.
//
// Every chain is served by its own endpoint exposing `gate_*` methods that
// read the gate contract state and submit signed transactions on behalf of
// the keeper account.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::LedgerError;
use crate::ledger::gateway::{LedgerGateway, LedgerResult};
use crate::ledger::models::{index_transactions, Chain, GateTx, Keeper, TransactionState, TxMap};

const NO_PARAMS: [(); 0] = [];

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Transaction state as returned by the contract, `commitTs == 0` when uncommitted
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransactionState {
    commit_ts: i64,
    keeper: Address,
    paid: bool,
}

impl RawTransactionState {
    fn into_state(self, chain: Chain) -> LedgerResult<TransactionState> {
        let commit_ts = match self.commit_ts {
            0 => None,
            secs => Some(DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                LedgerError::Decode {
                    chain,
                    message: format!("commit timestamp out of range: {}", secs),
                }
            })?),
        };

        Ok(TransactionState {
            commit_ts,
            keeper: self.keeper,
            paid: self.paid,
        })
    }
}

/// Ledger gateway backed by a JSON-RPC endpoint
pub struct RpcLedgerGateway {
    chain: Chain,
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl RpcLedgerGateway {
    pub fn new(chain: Chain, url: impl Into<String>, timeout: Duration) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport {
                chain,
                message: e.to_string(),
            })?;

        Ok(Self {
            chain,
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    #[instrument(skip(self, params), fields(chain = %self.chain))]
    async fn call<P, R>(&self, method: &str, params: P) -> LedgerResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.transport(e))?;

        let body: RpcResponse<R> = response.json().await.map_err(|e| LedgerError::Decode {
            chain: self.chain,
            message: format!("{}: {}", method, e),
        })?;

        if let Some(error) = body.error {
            debug!(method, code = error.code, "rpc call rejected");
            return Err(LedgerError::Rpc {
                chain: self.chain,
                code: error.code,
                message: error.message,
            });
        }

        body.result.ok_or_else(|| LedgerError::Decode {
            chain: self.chain,
            message: format!("{}: response carries neither result nor error", method),
        })
    }

    fn transport(&self, error: reqwest::Error) -> LedgerError {
        LedgerError::Transport {
            chain: self.chain,
            message: error.to_string(),
        }
    }

    async fn send_tx(&self, method: &str, signer: Address, tx: &GateTx) -> LedgerResult<()> {
        let tx_hash: String = self
            .call(method, (signer, tx.from, tx.value, tx.number))
            .await?;
        debug!(method, %signer, key = %tx.key(), %tx_hash, "transaction submitted");
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for RpcLedgerGateway {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_payin_transactions(&self) -> LedgerResult<TxMap> {
        let txs: Vec<GateTx> = self.call("gate_getPayinTransactions", NO_PARAMS).await?;
        Ok(index_transactions(txs))
    }

    async fn get_payout_transactions(&self) -> LedgerResult<TxMap> {
        let txs: Vec<GateTx> = self.call("gate_getPayoutTransactions", NO_PARAMS).await?;
        Ok(index_transactions(txs))
    }

    async fn get_transaction_state(&self, tx: &GateTx) -> LedgerResult<TransactionState> {
        let raw: RawTransactionState = self
            .call("gate_getTransactionState", (tx.from, tx.value, tx.number))
            .await?;
        raw.into_state(self.chain)
    }

    async fn commit_payout(&self, signer: Address, tx: &GateTx) -> LedgerResult<()> {
        self.send_tx("gate_commitPayout", signer, tx).await
    }

    async fn payout(&self, signer: Address, tx: &GateTx) -> LedgerResult<()> {
        self.send_tx("gate_payout", signer, tx).await
    }

    async fn get_keeper(&self, address: Address) -> LedgerResult<Keeper> {
        self.call("gate_getKeeper", (address,)).await
    }

    async fn freeze_keeper(&self, signer: Address, keeper: Address) -> LedgerResult<()> {
        let tx_hash: String = self.call("gate_freezeKeeper", (signer, keeper)).await?;
        debug!(%signer, %keeper, %tx_hash, "freeze submitted");
        Ok(())
    }

    async fn get_freezing_time(&self) -> LedgerResult<U256> {
        self.call("gate_getFreezingTime", NO_PARAMS).await
    }

    async fn get_block_timestamp(&self, block_number: u64) -> LedgerResult<i64> {
        self.call("gate_getBlockTimestamp", (block_number,)).await
    }
}

use std::time::Duration;

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::ledger::models::Chain;

/// Top-level error type for the gatekeeper
#[derive(Error, Debug)]
pub enum GatekeeperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    #[error("Fraud detection error: {0}")]
    Fraud(#[from] FraudError),

    #[error("Freezing time {0} does not fit into seconds range")]
    InvalidFreezingTime(U256),

    #[error("Account {0} is not a keeper")]
    NotKeeper(Address),

    #[error("Keeper {0} is frozen")]
    KeeperFrozen(Address),

    #[error("Status server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Failures of the ledger-access layer
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Transport error on {chain}: {message}")]
    Transport { chain: Chain, message: String },

    #[error("RPC error on {chain} ({code}): {message}")]
    Rpc {
        chain: Chain,
        code: i64,
        message: String,
    },

    #[error("Malformed response from {chain}: {message}")]
    Decode { chain: Chain, message: String },
}

/// Outcomes of an unpaid transaction that stop the payout attempt
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Delay not elapsed, {remaining:?} left")]
    DelayNotElapsed { remaining: Duration },

    #[error("Transaction already paid")]
    AlreadyPaid,

    #[error("Transaction committed by other keeper {0}")]
    CommittedByOtherKeeper(Address),

    #[error("Lookup failed: {0}")]
    Lookup(#[source] LedgerError),

    #[error("Commit failed: {0}")]
    Commit(#[source] LedgerError),

    #[error("Payout failed: {0}")]
    Execute(#[source] LedgerError),

    #[error("Cancelled while waiting out freezing time")]
    Cancelled,
}

impl PayoutError {
    /// Protocol-state outcomes that are part of normal operation
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PayoutError::DelayNotElapsed { .. }
                | PayoutError::AlreadyPaid
                | PayoutError::CommittedByOtherKeeper(_)
                | PayoutError::Cancelled
        )
    }
}

/// Outcomes of a scummy transaction that stop the freeze attempt
#[derive(Error, Debug)]
pub enum FraudError {
    #[error("Keeper {0} already frozen")]
    KeeperAlreadyFrozen(Address),

    #[error("Lookup failed: {0}")]
    Lookup(#[source] LedgerError),

    #[error("Freeze failed: {0}")]
    Freeze(#[source] LedgerError),
}

impl FraudError {
    pub fn is_expected(&self) -> bool {
        matches!(self, FraudError::KeeperAlreadyFrozen(_))
    }
}

impl From<config::ConfigError> for GatekeeperError {
    fn from(error: config::ConfigError) -> Self {
        GatekeeperError::Config(error.to_string())
    }
}

/// Result type alias for the gatekeeper
pub type GatekeeperResult<T> = Result<T, GatekeeperError>;

use alloy_primitives::Address;
use config::{Environment, File, FileFormat};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::time::Duration;

use crate::error::GatekeeperResult;
use crate::ledger::models::Chain;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gatekeeper: GatekeeperConfig,
    pub ledger: LedgerConfig,
    pub keeper: KeeperConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

/// Protocol timing and worker pool sizing
#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct GatekeeperConfig {
    /// Chain this instance pays out on
    pub direction: Chain,
    /// Minimum age of a payin block before it is paid out
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_delay")]
    pub delay: Duration,
    /// Reconciliation period
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_period")]
    pub period: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_reload_freezing_period")]
    pub reload_freezing_period: Duration,
    #[serde(default = "default_payout_workers")]
    pub payout_workers: usize,
    #[serde(default = "default_fraud_workers")]
    pub fraud_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub masterchain_url: String,
    pub sidechain_url: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeeperConfig {
    /// Keeper account payouts and freezes are sent from
    pub address: Address,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StatusConfig {
    pub bind_address: Option<String>,
}

fn default_delay() -> Duration {
    Duration::from_secs(15)
}

fn default_period() -> Duration {
    Duration::from_secs(15)
}

fn default_reload_freezing_period() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_payout_workers() -> usize {
    32
}

fn default_fraud_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Loads the YAML file named by `GATEKEEPER_CONFIG` (default `gatekeeper.yaml`,
    /// optional) overridden by `GATEKEEPER_<SECTION>__<KEY>` variables.
    pub fn load() -> GatekeeperResult<Self> {
        let path = std::env::var("GATEKEEPER_CONFIG")
            .unwrap_or_else(|_| "gatekeeper.yaml".to_string());

        let config = config::Config::builder()
            .add_source(File::with_name(&path).format(FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix("GATEKEEPER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{GatekeeperError, GatekeeperResult};
use crate::ledger::LedgerGateway;

/// Cache value before the first successful load. Never a valid freezing time,
/// since it does not fit a `chrono::Duration`.
const UNLOADED: u64 = u64::MAX;

/// Local copy of the contract's freezing time.
///
/// Written by the refresh loop, read by every payout task; the value lives in
/// an atomic so readers never wait on the reconciliation lock.
pub struct FreezingTimeCache {
    gate: Arc<dyn LedgerGateway>,
    secs: AtomicU64,
}

impl FreezingTimeCache {
    pub fn new(gate: Arc<dyn LedgerGateway>) -> Self {
        Self {
            gate,
            secs: AtomicU64::new(UNLOADED),
        }
    }

    /// Freezing time currently in effect, zero until the first load
    pub fn get(&self) -> Duration {
        match self.secs.load(Ordering::Acquire) {
            UNLOADED => Duration::ZERO,
            secs => Duration::from_secs(secs),
        }
    }

    /// Re-reads the freezing time from the gate.
    ///
    /// Returns `true` when the cached value changed. The first successful load
    /// always counts as a change.
    pub async fn refresh(&self) -> GatekeeperResult<bool> {
        let raw = self.gate.get_freezing_time().await?;
        let secs: u64 = raw
            .try_into()
            .map_err(|_| GatekeeperError::InvalidFreezingTime(raw))?;
        if chrono::Duration::from_std(Duration::from_secs(secs)).is_err() {
            return Err(GatekeeperError::InvalidFreezingTime(raw));
        }

        let previous = self.secs.swap(secs, Ordering::AcqRel);
        if previous == secs {
            debug!(freezing_time_secs = secs, "freezing time unchanged");
            return Ok(false);
        }

        info!(
            previous_secs = ?(previous != UNLOADED).then_some(previous),
            freezing_time_secs = secs,
            chain = %self.gate.chain(),
            "freezing time changed"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use crate::ledger::models::Chain;
    use alloy_primitives::U256;

    #[tokio::test]
    async fn test_refresh_is_noop_on_equal_value() {
        let ledger = Arc::new(InMemoryLedger::new(Chain::Masterchain));
        ledger.set_freezing_time(U256::from(600));
        let cache = FreezingTimeCache::new(ledger.clone());

        assert!(cache.refresh().await.unwrap());
        assert_eq!(cache.get(), Duration::from_secs(600));

        assert!(!cache.refresh().await.unwrap());
        assert_eq!(cache.get(), Duration::from_secs(600));

        ledger.set_freezing_time(U256::from(120));
        assert!(cache.refresh().await.unwrap());
        assert_eq!(cache.get(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_refresh_rejects_out_of_range_value() {
        let ledger = Arc::new(InMemoryLedger::new(Chain::Sidechain));
        ledger.set_freezing_time(U256::from(u64::MAX) + U256::from(1));
        let cache = FreezingTimeCache::new(ledger);

        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(err, GatekeeperError::InvalidFreezingTime(_)));
        assert_eq!(cache.get(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_refresh_rejects_value_beyond_duration_range() {
        let ledger = Arc::new(InMemoryLedger::new(Chain::Sidechain));
        ledger.set_freezing_time(U256::from(u64::MAX));
        let cache = FreezingTimeCache::new(ledger);

        assert!(matches!(
            cache.refresh().await,
            Err(GatekeeperError::InvalidFreezingTime(_))
        ));
        assert_eq!(cache.get(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_first_load_of_zero_counts_as_change() {
        let ledger = Arc::new(InMemoryLedger::new(Chain::Masterchain));
        ledger.set_freezing_time(U256::ZERO);
        let cache = FreezingTimeCache::new(ledger);

        assert_eq!(cache.get(), Duration::ZERO);
        assert!(cache.refresh().await.unwrap());
        assert!(!cache.refresh().await.unwrap());
        assert_eq!(cache.get(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_refresh_keeps_value_on_ledger_error() {
        let ledger = Arc::new(InMemoryLedger::new(Chain::Sidechain));
        ledger.set_freezing_time(U256::from(30));
        let cache = FreezingTimeCache::new(ledger.clone());
        cache.refresh().await.unwrap();

        ledger.fail("get_freezing_time");
        assert!(matches!(cache.refresh().await, Err(GatekeeperError::Ledger(_))));
        assert_eq!(cache.get(), Duration::from_secs(30));
    }
}

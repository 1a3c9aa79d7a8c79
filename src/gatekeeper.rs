// Gatekeeper controller.
//
// Runs reconciliation passes on a fixed period and hands every mismatch to
// the payout or fraud worker pool. Ticks that fire while a pass is running
// collapse into a single pending pass.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GatekeeperConfig;
use crate::error::{GatekeeperError, GatekeeperResult};
use crate::ledger::models::Chain;
use crate::ledger::GatewayPair;
use crate::settlement::dispatcher::{DispatchOutcome, TaskDispatcher};
use crate::settlement::fraud::FraudDetector;
use crate::settlement::freezing::FreezingTimeCache;
use crate::settlement::payout::PayoutExecutor;
use crate::settlement::reconciler::{load_transactions, reconcile, Reconciliation};

/// Counters of the last completed reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub finished_at: DateTime<Utc>,
    pub payins: usize,
    pub payouts: usize,
    pub unpaid: usize,
    pub scummy: usize,
}

#[derive(Debug, Clone, Default)]
struct PassStatus {
    passes: u64,
    last_pass: Option<PassSummary>,
    last_error: Option<String>,
}

/// Point-in-time view of the gatekeeper, served by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub direction: Chain,
    pub keeper: Address,
    pub freezing_time_secs: u64,
    pub passes: u64,
    pub last_pass: Option<PassSummary>,
    pub last_error: Option<String>,
}

pub struct Gatekeeper {
    config: GatekeeperConfig,
    keeper: Address,
    gates: GatewayPair,
    freezing: Arc<FreezingTimeCache>,
    payouts: Arc<PayoutExecutor>,
    fraud: Arc<FraudDetector>,
    pass_lock: Mutex<()>,
    status: RwLock<PassStatus>,
}

impl Gatekeeper {
    /// Creates a gatekeeper acting as `keeper`.
    ///
    /// Fails if the account is not a registered, active keeper on the output gate.
    pub async fn new(config: GatekeeperConfig, keeper: Address, gates: GatewayPair) -> GatekeeperResult<Self> {
        info!(
            direction = %config.direction,
            payins_from = %config.direction.opposite(),
            delay_secs = config.delay.as_secs(),
            keeper = %keeper,
            "starting gatekeeper instance"
        );

        let account = gates.output.get_keeper(keeper).await?;
        if !account.is_registered() {
            return Err(GatekeeperError::NotKeeper(keeper));
        }
        if account.frozen {
            return Err(GatekeeperError::KeeperFrozen(keeper));
        }

        info!(keeper = %keeper, day_limit = %account.day_limit, "keeper verified");

        let freezing = Arc::new(FreezingTimeCache::new(gates.output.clone()));
        let payouts = Arc::new(PayoutExecutor::new(
            gates.input.clone(),
            gates.output.clone(),
            keeper,
            config.delay,
            freezing.clone(),
        ));
        let fraud = Arc::new(FraudDetector::new(gates.output.clone(), keeper));

        Ok(Self {
            config,
            keeper,
            gates,
            freezing,
            payouts,
            fraud,
            pass_lock: Mutex::new(()),
            status: RwLock::new(PassStatus::default()),
        })
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// The freezing time is loaded once before anything else; failing to load
    /// it stops the gatekeeper before any payout is attempted.
    pub async fn serve(self: Arc<Self>, shutdown: CancellationToken) -> GatekeeperResult<()> {
        self.freezing.refresh().await?;
        info!(
            freezing_time_secs = self.freezing.get().as_secs(),
            period_secs = self.config.period.as_secs(),
            "gatekeeper serving"
        );

        let (payouts, mut workers) = TaskDispatcher::spawn(
            "payout",
            self.payouts.clone(),
            self.config.payout_workers,
            self.config.queue_capacity,
            shutdown.clone(),
        );
        let (fraud, fraud_workers) = TaskDispatcher::spawn(
            "fraud",
            self.fraud.clone(),
            self.config.fraud_workers,
            self.config.queue_capacity,
            shutdown.clone(),
        );
        workers.extend(fraud_workers);

        let tick = Arc::new(Notify::new());
        let ticker = tokio::spawn(run_ticker(self.config.period, tick.clone(), shutdown.clone()));
        let refresher = tokio::spawn(self.clone().freezing_time_routine(shutdown.clone()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.notified() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.run_pass(&payouts, &fraud) => {
                            if let Err(e) = result {
                                warn!("failed to process transactions: {}", e);
                            }
                        }
                    }
                }
            }
        }

        info!(
            pending_payouts = payouts.in_flight(),
            pending_freezes = fraud.in_flight(),
            "gatekeeper stopping"
        );
        drop(payouts);
        drop(fraud);

        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!("worker task failed: {}", e);
            }
        }
        let (ticker, refresher) = tokio::join!(ticker, refresher);
        for result in [ticker, refresher] {
            if let Err(e) = result {
                error!("background task failed: {}", e);
            }
        }

        info!("gatekeeper stopped");
        Ok(())
    }

    /// Loads both transaction sets and diffs them. Passes never overlap.
    #[instrument(skip(self), fields(direction = %self.config.direction))]
    pub async fn reconcile_once(&self) -> GatekeeperResult<Reconciliation> {
        let _pass = self.pass_lock.lock().await;
        debug!("start transaction processing");

        let (in_txs, out_txs) = match load_transactions(&self.gates).await {
            Ok(loaded) => loaded,
            Err(e) => {
                let mut status = self.status.write();
                status.passes += 1;
                status.last_error = Some(e.to_string());
                return Err(e.into());
            }
        };

        let result = reconcile(&in_txs, &out_txs);

        let mut status = self.status.write();
        status.passes += 1;
        status.last_error = None;
        status.last_pass = Some(PassSummary {
            finished_at: Utc::now(),
            payins: in_txs.len(),
            payouts: out_txs.len(),
            unpaid: result.unpaid.len(),
            scummy: result.scummy.len(),
        });

        debug!(
            unpaid = result.unpaid.len(),
            scummy = result.scummy.len(),
            "finish transaction processing"
        );
        Ok(result)
    }

    async fn run_pass(&self, payouts: &TaskDispatcher, fraud: &TaskDispatcher) -> GatekeeperResult<()> {
        let result = self.reconcile_once().await?;

        for tx in result.unpaid {
            debug!(
                from = %tx.from,
                value = %tx.value,
                number = %tx.number,
                block_number = tx.block_number,
                "found unpaid transaction"
            );
            log_dispatch("payout", payouts.dispatch(tx));
        }

        for tx in result.scummy {
            log_dispatch("fraud", fraud.dispatch(tx));
        }

        Ok(())
    }

    async fn freezing_time_routine(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self.config.reload_freezing_period;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.freezing.refresh().await {
                        warn!("failed to reload freezing time: {}", e);
                    }
                }
            }
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let status = self.status.read().clone();
        StatusSnapshot {
            direction: self.config.direction,
            keeper: self.keeper,
            freezing_time_secs: self.freezing.get().as_secs(),
            passes: status.passes,
            last_pass: status.last_pass,
            last_error: status.last_error,
        }
    }
}

fn log_dispatch(pool: &str, outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Queued | DispatchOutcome::InFlight => {}
        DispatchOutcome::Backlogged => debug!(pool, "worker queue full, transaction deferred"),
        DispatchOutcome::Closed => warn!(pool, "worker pool closed, transaction dropped"),
    }
}

/// Signals a pass every `period`, starting immediately.
///
/// `Notify` holds at most one permit, so ticks fired during a running pass
/// leave exactly one pass pending.
async fn run_ticker(period: std::time::Duration, tick: Arc<Notify>, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => tick.notify_one(),
        }
    }
}

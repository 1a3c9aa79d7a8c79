// Bounded worker pool for per-transaction follow-up work.
//
// Each pool owns a fixed number of workers draining a bounded queue. A key
// stays registered from enqueue until its handler returns, so a transaction
// rediscovered by later passes is not processed twice at the same time.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ledger::models::{GateTx, TransactionKey};

/// Work performed for a single mismatched transaction
#[async_trait]
pub trait TxHandler: Send + Sync {
    async fn handle(&self, tx: &GateTx, shutdown: &CancellationToken);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// Already queued or being processed
    InFlight,
    /// Queue full; the transaction is picked up again by a later pass
    Backlogged,
    Closed,
}

type InFlight = Arc<Mutex<HashSet<TransactionKey>>>;

/// Removes a key from the in-flight set when processing ends, panics included
struct InFlightGuard {
    in_flight: InFlight,
    key: TransactionKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

pub struct TaskDispatcher {
    name: &'static str,
    sender: mpsc::Sender<GateTx>,
    in_flight: InFlight,
}

impl TaskDispatcher {
    /// Starts `workers` workers feeding from a queue of `capacity` transactions.
    ///
    /// Workers stop once `shutdown` is cancelled.
    pub fn spawn(
        name: &'static str,
        handler: Arc<dyn TxHandler>,
        workers: usize,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    name,
                    worker,
                    handler.clone(),
                    receiver.clone(),
                    in_flight.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        let dispatcher = Self {
            name,
            sender,
            in_flight,
        };
        (dispatcher, handles)
    }

    pub fn dispatch(&self, tx: GateTx) -> DispatchOutcome {
        let key = tx.key();
        if !self.in_flight.lock().insert(key) {
            return DispatchOutcome::InFlight;
        }

        match self.sender.try_send(tx) {
            Ok(()) => DispatchOutcome::Queued,
            Err(e) => {
                self.in_flight.lock().remove(&key);
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        debug!(pool = self.name, %key, "queue full, deferring transaction");
                        DispatchOutcome::Backlogged
                    }
                    mpsc::error::TrySendError::Closed(_) => DispatchOutcome::Closed,
                }
            }
        }
    }

    /// Number of transactions queued or being processed
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

async fn run_worker(
    name: &'static str,
    worker: usize,
    handler: Arc<dyn TxHandler>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<GateTx>>>,
    in_flight: InFlight,
    shutdown: CancellationToken,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                tx = receiver.recv() => tx,
            }
        };

        let Some(tx) = next else { break };

        let _guard = InFlightGuard {
            in_flight: in_flight.clone(),
            key: tx.key(),
        };
        handler.handle(&tx, &shutdown).await;
    }

    debug!(pool = name, worker, "worker stopped");
}

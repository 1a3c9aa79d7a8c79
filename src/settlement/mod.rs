// Reconciliation and settlement of bridge transfers
pub mod dispatcher;
pub mod fraud;
pub mod freezing;
pub mod payout;
pub mod reconciler;


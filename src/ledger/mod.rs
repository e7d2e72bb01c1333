//! Ledger maintenance: account balances derived from the transaction history.
//!
//! Balances change in two ways:
//! - incrementally, by one signed delta whenever a transaction is created,
//!   edited or deleted;
//! - in full, by zeroing every balance and replaying all transactions, either
//!   on a schedule or on request.

mod core;
mod endpoint;
mod scheduler;

pub use core::{BALANCE_FIELD, BalanceChange, Ledger, RecomputeSummary};
pub use endpoint::{RecalculateBalancesState, recalculate_balances_endpoint};
pub use scheduler::{DEFAULT_RECALCULATION_INTERVAL, spawn_balance_recalculation};

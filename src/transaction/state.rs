//! The state shared by the transaction endpoints.

use std::time::Duration;

use axum::extract::FromRef;

use crate::{AppState, ledger::Ledger, store::SqliteDocumentStore};

/// The state needed to read and write transactions.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The store holding the transactions.
    pub store: SqliteDocumentStore,
    /// The ledger that keeps account balances in step with transaction writes.
    pub ledger: Ledger<SqliteDocumentStore>,
    /// The upper bound on each store call.
    pub timeout: Duration,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            ledger: state.ledger.clone(),
            timeout: state.config.timeouts.database,
        }
    }
}

#[cfg(test)]
pub(crate) fn get_test_transaction_state() -> TransactionState {
    let store = SqliteDocumentStore::open_in_memory().expect("could not open store");
    let timeout = Duration::from_secs(5);

    TransactionState {
        ledger: Ledger::new(store.clone(), timeout),
        store,
        timeout,
    }
}

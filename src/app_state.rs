//! Implements a struct that holds the state of the REST server.

use crate::{config::AppConfig, ledger::Ledger, store::SqliteDocumentStore};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The document store holding transactions, accounts and categories.
    pub store: SqliteDocumentStore,

    /// The ledger that maintains account balances.
    pub ledger: Ledger<SqliteDocumentStore>,

    /// The application settings.
    pub config: AppConfig,
}

impl AppState {
    /// Create a new [AppState] over `store`.
    pub fn new(store: SqliteDocumentStore, config: AppConfig) -> Self {
        Self {
            ledger: Ledger::new(store.clone(), config.timeouts.database),
            store,
            config,
        }
    }
}

//! On-demand balance recalculation.

use axum::{
    Json,
    extract::{FromRef, State},
};

use crate::{
    AppState, Error,
    ledger::{Ledger, RecomputeSummary},
    store::SqliteDocumentStore,
};

/// The state needed to recalculate balances.
#[derive(Debug, Clone)]
pub struct RecalculateBalancesState {
    /// The ledger that owns the balances.
    pub ledger: Ledger<SqliteDocumentStore>,
}

impl FromRef<AppState> for RecalculateBalancesState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            ledger: state.ledger.clone(),
        }
    }
}

/// Recompute every account balance from the transaction history now.
pub async fn recalculate_balances_endpoint(
    State(state): State<RecalculateBalancesState>,
) -> Result<Json<RecomputeSummary>, Error> {
    tracing::info!("balance recalculation requested");

    state.ledger.recompute_all_balances().await.map(Json)
}

#[cfg(test)]
mod recalculate_balances_endpoint_tests {
    use std::time::Duration;

    use axum::extract::State;
    use serde_json::json;

    use crate::{
        ledger::{Ledger, RecalculateBalancesState, RecomputeSummary, recalculate_balances_endpoint},
        store::{Collection, DocumentStore, SqliteDocumentStore, to_document},
    };

    #[tokio::test]
    async fn returns_summary() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert(
                Collection::Accounts,
                to_document(&json!({"balance": 3})).unwrap(),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        let state = RecalculateBalancesState {
            ledger: Ledger::new(store, Duration::from_secs(1)),
        };

        let summary = recalculate_balances_endpoint(State(state)).await.unwrap();

        assert_eq!(
            summary.0,
            RecomputeSummary {
                accounts_reset: 1,
                applied: 0,
                skipped: 0
            }
        );
    }
}

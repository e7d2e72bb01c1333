//! Defines the endpoint for deleting a transaction.

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::Value;

use crate::{
    Error,
    document_id::DocumentId,
    json::message,
    ledger::BalanceChange,
    store::{Collection, DocumentStore, find_one},
    transaction::{Transaction, TransactionState},
};

/// Delete a transaction and take its effect off its account's balance.
pub async fn delete_transaction_endpoint(
    State(state): State<TransactionState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<Value>, Error> {
    let transaction_id = DocumentId::parse(&transaction_id)?;

    let _guard = state.ledger.begin_write().await;

    let old: Transaction = find_one(
        &state.store,
        Collection::Transactions,
        transaction_id,
        state.timeout,
    )
    .await?;

    let deleted = state
        .store
        .delete_by_id(Collection::Transactions, transaction_id, state.timeout)
        .await?;
    if !deleted {
        return Err(Error::NotFound);
    }

    match state
        .ledger
        .apply_transaction_delta(&old, BalanceChange::Reverse)
        .await
    {
        Ok(()) => {}
        Err(error @ (Error::NoAssociatedAccount(_) | Error::AccountNotFound(_))) => {
            tracing::debug!("deleted transaction {transaction_id} not reversed: {error}");
        }
        Err(error) => {
            tracing::warn!(
                "could not reverse deleted transaction {transaction_id}, \
                leaving it for the next recalculation: {error}"
            );
        }
    }

    Ok(message("transaction deleted"))
}

//! Defines the endpoint for creating a new transaction.

use axum::{Json, extract::State, http::StatusCode};
use time::OffsetDateTime;

use crate::{
    Error,
    json::{Created, JsonBody},
    ledger::BalanceChange,
    store::{Collection, DocumentStore, to_document},
    transaction::{Transaction, TransactionData, TransactionState},
};

/// Record a new transaction and add it to its account's balance.
///
/// If the balance cannot be updated the transaction is removed again, so the
/// store never holds a transaction whose effect is missing from its account.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    JsonBody(data): JsonBody<TransactionData>,
) -> Result<(StatusCode, Json<Created>), Error> {
    data.validate()?;

    let now = OffsetDateTime::now_utc();
    let data = TransactionData {
        created_at: Some(now),
        updated_at: Some(now),
        ..data
    };
    let document = to_document(&data)?;

    let _guard = state.ledger.begin_write().await;

    let id = state
        .store
        .insert(Collection::Transactions, document, state.timeout)
        .await?;
    let transaction = Transaction { id, data };

    if transaction.data.account_id.is_some()
        && let Err(error) = state
            .ledger
            .apply_transaction_delta(&transaction, BalanceChange::Apply)
            .await
    {
        tracing::error!("could not apply new transaction {id} to its account: {error}");

        if let Err(delete_error) = state
            .store
            .delete_by_id(Collection::Transactions, id, state.timeout)
            .await
        {
            tracing::error!("could not remove transaction {id} after failed apply: {delete_error}");
        }

        return Err(error);
    }

    Ok((StatusCode::CREATED, Json(Created { id })))
}

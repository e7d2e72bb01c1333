//! Defines the endpoint for replacing an existing transaction.

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    Error,
    document_id::DocumentId,
    json::{JsonBody, message},
    ledger::BalanceChange,
    store::{Collection, DocumentStore, find_one, to_document},
    transaction::{Transaction, TransactionData, TransactionState},
};

/// Replace a transaction and move its effect on the balances accordingly.
///
/// The new version is applied before the document is written and the old
/// version is reversed afterwards. If the write fails, the new delta is undone.
pub async fn edit_transaction_endpoint(
    State(state): State<TransactionState>,
    Path(transaction_id): Path<String>,
    JsonBody(data): JsonBody<TransactionData>,
) -> Result<Json<Value>, Error> {
    let transaction_id = DocumentId::parse(&transaction_id)?;
    data.validate()?;

    let _guard = state.ledger.begin_write().await;

    let old: Transaction = find_one(
        &state.store,
        Collection::Transactions,
        transaction_id,
        state.timeout,
    )
    .await?;

    let new = Transaction {
        id: transaction_id,
        data: TransactionData {
            created_at: old.data.created_at,
            updated_at: Some(OffsetDateTime::now_utc()),
            ..data
        },
    };
    let document = to_document(&new.data)?;

    let has_account = new.data.account_id.is_some();
    if has_account {
        state
            .ledger
            .apply_transaction_delta(&new, BalanceChange::Apply)
            .await?;
    }

    let written = state
        .store
        .update_by_id(
            Collection::Transactions,
            transaction_id,
            document,
            state.timeout,
        )
        .await
        .and_then(|matched| if matched { Ok(()) } else { Err(Error::NotFound) });

    if let Err(error) = written {
        tracing::error!("could not update transaction {transaction_id}: {error}");

        if has_account
            && let Err(reverse_error) = state
                .ledger
                .apply_transaction_delta(&new, BalanceChange::Reverse)
                .await
        {
            tracing::error!(
                "could not undo balance change for transaction {transaction_id}: {reverse_error}"
            );
        }

        return Err(error);
    }

    match state
        .ledger
        .apply_transaction_delta(&old, BalanceChange::Reverse)
        .await
    {
        Ok(()) => {}
        Err(error @ (Error::NoAssociatedAccount(_) | Error::AccountNotFound(_))) => {
            tracing::debug!(
                "previous version of transaction {transaction_id} not reversed: {error}"
            );
        }
        Err(error) => {
            tracing::warn!(
                "could not reverse previous version of transaction {transaction_id}, \
                leaving it for the next recalculation: {error}"
            );
        }
    }

    Ok(message("transaction updated"))
}

#[cfg(test)]
mod edit_transaction_endpoint_tests {
    use axum::extract::{Path, State};
    use serde_json::{Value, json};

    use crate::{
        Error,
        document_id::DocumentId,
        json::JsonBody,
        store::{Collection, DocumentStore, find_one, to_document},
        transaction::{
            Transaction, TransactionData, TransactionState, create_transaction_endpoint,
            edit_transaction_endpoint, get_test_transaction_state,
        },
    };

    async fn must_create_account(state: &TransactionState) -> DocumentId {
        state
            .store
            .insert(
                Collection::Accounts,
                to_document(&json!({"name": "Main", "type": "bank", "balance": 0})).unwrap(),
                state.timeout,
            )
            .await
            .unwrap()
    }

    async fn must_get_balance(state: &TransactionState, account_id: DocumentId) -> f64 {
        let account: Value = find_one(&state.store, Collection::Accounts, account_id, state.timeout)
            .await
            .unwrap();

        account["balance"].as_f64().unwrap()
    }

    #[track_caller]
    fn must_data(value: Value) -> TransactionData {
        serde_json::from_value(value).expect("invalid test transaction")
    }

    async fn must_create_transaction(state: &TransactionState, value: Value) -> DocumentId {
        let (_, created) =
            create_transaction_endpoint(State(state.clone()), JsonBody(must_data(value)))
                .await
                .expect("could not create transaction");

        created.0.id
    }

    #[tokio::test]
    async fn moves_delta_between_accounts() {
        let state = get_test_transaction_state();
        let first = must_create_account(&state).await;
        let second = must_create_account(&state).await;
        let id = must_create_transaction(
            &state,
            json!({"amount": 40, "date": "2024-03-05", "type": "expense", "account_id": first}),
        )
        .await;

        edit_transaction_endpoint(
            State(state.clone()),
            Path(id.to_hex()),
            JsonBody(must_data(json!({
                "amount": 15,
                "date": "2024-03-06",
                "type": "income",
                "account_id": second
            }))),
        )
        .await
        .unwrap();

        assert_eq!(must_get_balance(&state, first).await, 0.0);
        assert_eq!(must_get_balance(&state, second).await, 15.0);

        let transaction: Transaction =
            find_one(&state.store, Collection::Transactions, id, state.timeout)
                .await
                .unwrap();
        assert_eq!(transaction.data.amount, 15.0);
        assert!(transaction.data.updated_at >= transaction.data.created_at);
    }

    #[tokio::test]
    async fn adding_an_account_applies_only_new_delta() {
        let state = get_test_transaction_state();
        let account_id = must_create_account(&state).await;
        let id = must_create_transaction(
            &state,
            json!({"amount": 8, "date": "2024-03-05", "type": "income"}),
        )
        .await;

        edit_transaction_endpoint(
            State(state.clone()),
            Path(id.to_hex()),
            JsonBody(must_data(json!({
                "amount": 8,
                "date": "2024-03-05",
                "type": "income",
                "account_id": account_id
            }))),
        )
        .await
        .unwrap();

        assert_eq!(must_get_balance(&state, account_id).await, 8.0);
    }

    #[tokio::test]
    async fn missing_new_account_changes_nothing() {
        let state = get_test_transaction_state();
        let account_id = must_create_account(&state).await;
        let id = must_create_transaction(
            &state,
            json!({"amount": 8, "date": "2024-03-05", "type": "income", "account_id": account_id}),
        )
        .await;

        let result = edit_transaction_endpoint(
            State(state.clone()),
            Path(id.to_hex()),
            JsonBody(must_data(json!({
                "amount": 100,
                "date": "2024-03-05",
                "type": "income",
                "account_id": DocumentId::new()
            }))),
        )
        .await;

        assert!(matches!(result, Err(Error::AccountNotFound(_))));
        assert_eq!(must_get_balance(&state, account_id).await, 8.0);
        let transaction: Transaction =
            find_one(&state.store, Collection::Transactions, id, state.timeout)
                .await
                .unwrap();
        assert_eq!(transaction.data.amount, 8.0);
    }

    #[tokio::test]
    async fn missing_transaction_is_not_found() {
        let state = get_test_transaction_state();

        let result = edit_transaction_endpoint(
            State(state),
            Path(DocumentId::new().to_hex()),
            JsonBody(must_data(json!({"amount": 1, "date": "2024-03-05", "type": "income"}))),
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound)));
    }
}

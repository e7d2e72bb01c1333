//! The JSON endpoints for managing accounts.

use std::time::Duration;

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::{
    AppState, Error,
    account::{Account, AccountData},
    document_id::DocumentId,
    json::{Created, JsonBody, message},
    ledger::BALANCE_FIELD,
    store::{
        Collection, DocumentStore, Filter, SqliteDocumentStore, find_all, find_one, to_document,
    },
};

/// The state needed to manage accounts.
#[derive(Debug, Clone)]
pub struct AccountState {
    /// The store holding the accounts.
    pub store: SqliteDocumentStore,
    /// The upper bound on each store call.
    pub timeout: Duration,
}

impl FromRef<AppState> for AccountState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            timeout: state.config.timeouts.database,
        }
    }
}

/// List every account.
pub async fn list_accounts_endpoint(
    State(state): State<AccountState>,
) -> Result<Json<Vec<Account>>, Error> {
    find_all(&state.store, Collection::Accounts, &Filter::all(), state.timeout)
        .await
        .map(Json)
}

/// Get a single account.
pub async fn get_account_endpoint(
    State(state): State<AccountState>,
    Path(account_id): Path<String>,
) -> Result<Json<Account>, Error> {
    let account_id = DocumentId::parse(&account_id)?;

    find_one(&state.store, Collection::Accounts, account_id, state.timeout)
        .await
        .map(Json)
}

/// Create an account with a zero balance.
pub async fn create_account_endpoint(
    State(state): State<AccountState>,
    JsonBody(data): JsonBody<AccountData>,
) -> Result<(StatusCode, Json<Created>), Error> {
    data.validate()?;

    let mut document = to_document(&data)?;
    document.insert(BALANCE_FIELD.to_owned(), json!(0.0));

    let id = state
        .store
        .insert(Collection::Accounts, document, state.timeout)
        .await?;

    tracing::info!("created account {id}");
    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// Replace the client editable fields of an account. The balance is kept.
pub async fn edit_account_endpoint(
    State(state): State<AccountState>,
    Path(account_id): Path<String>,
    JsonBody(data): JsonBody<AccountData>,
) -> Result<Json<Value>, Error> {
    let account_id = DocumentId::parse(&account_id)?;
    data.validate()?;

    let matched = state
        .store
        .update_by_id(
            Collection::Accounts,
            account_id,
            to_document(&data)?,
            state.timeout,
        )
        .await?;
    if !matched {
        return Err(Error::NotFound);
    }

    Ok(message("account updated"))
}

/// Delete an account. Its transactions are kept.
pub async fn delete_account_endpoint(
    State(state): State<AccountState>,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, Error> {
    let account_id = DocumentId::parse(&account_id)?;

    let deleted = state
        .store
        .delete_by_id(Collection::Accounts, account_id, state.timeout)
        .await?;
    if !deleted {
        return Err(Error::NotFound);
    }

    tracing::info!("deleted account {account_id}");
    Ok(message("account deleted"))
}

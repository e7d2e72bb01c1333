//! Keeps account balances consistent with the transaction history.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};

use crate::{
    Error,
    store::{Collection, Document, DocumentStore, Filter, ID_FIELD, from_document},
    transaction::Transaction,
};

/// The account field maintained by the ledger.
pub const BALANCE_FIELD: &str = "balance";

/// Whether a transaction's effect is added to or taken off its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    /// Add the transaction's effect, e.g. after it was created.
    Apply,
    /// Undo the transaction's effect, e.g. after it was deleted.
    Reverse,
}

impl BalanceChange {
    fn factor(self) -> f64 {
        match self {
            BalanceChange::Apply => 1.0,
            BalanceChange::Reverse => -1.0,
        }
    }
}

/// The outcome of a full balance recomputation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeSummary {
    /// The number of account balances set back to zero.
    pub accounts_reset: usize,
    /// The number of transactions replayed onto a balance.
    pub applied: usize,
    /// The number of transactions that could not be decoded or applied.
    pub skipped: usize,
}

/// Applies balance deltas and recomputes balances from scratch.
///
/// Transaction writes and recomputations are serialized through a shared
/// lock: a write holds the guard from [Ledger::begin_write] for the document
/// write and its deltas, a recomputation holds the lock exclusively.
#[derive(Debug, Clone)]
pub struct Ledger<S> {
    store: S,
    timeout: Duration,
    maintenance: Arc<RwLock<()>>,
}

impl<S: DocumentStore> Ledger<S> {
    /// Create a ledger over `store` whose store calls are bounded by `timeout`.
    pub fn new(store: S, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            maintenance: Arc::new(RwLock::new(())),
        }
    }

    /// Wait for any running recomputation and keep new ones out until the
    /// returned guard is dropped.
    pub async fn begin_write(&self) -> OwnedRwLockReadGuard<()> {
        self.maintenance.clone().read_owned().await
    }

    /// Add (or with [BalanceChange::Reverse], take off) the effect of
    /// `transaction` on its account's balance.
    ///
    /// The account is changed with a single atomic increment.
    ///
    /// # Errors
    /// Returns [Error::NoAssociatedAccount] without touching the store if the
    /// transaction has no account, and [Error::AccountNotFound] if the account
    /// does not exist.
    pub async fn apply_transaction_delta(
        &self,
        transaction: &Transaction,
        change: BalanceChange,
    ) -> Result<(), Error> {
        let account_id = transaction
            .data
            .account_id
            .ok_or(Error::NoAssociatedAccount(transaction.id))?;

        let delta = transaction.signed_amount() * change.factor();

        let matched = self
            .store
            .increment_by_id(
                Collection::Accounts,
                account_id,
                BALANCE_FIELD,
                delta,
                self.timeout,
            )
            .await?;

        if !matched {
            return Err(Error::AccountNotFound(account_id));
        }

        Ok(())
    }

    /// Set every account balance to zero and replay all transactions in the
    /// order they were recorded.
    ///
    /// Transactions that cannot be decoded or applied are logged and skipped.
    /// Increments already made are kept if the run stops early.
    ///
    /// # Errors
    /// Returns an error if the balances could not be reset or the
    /// transactions could not be read.
    pub async fn recompute_all_balances(&self) -> Result<RecomputeSummary, Error> {
        let _guard = self.maintenance.write().await;

        let accounts_reset = self
            .store
            .update_many(
                Collection::Accounts,
                &Filter::all(),
                zero_balance(),
                self.timeout,
            )
            .await
            .inspect_err(|error| tracing::error!("could not reset account balances: {error}"))?;

        let documents = self
            .store
            .find(Collection::Transactions, &Filter::all(), self.timeout)
            .await
            .inspect_err(|error| tracing::error!("could not read transactions: {error}"))?;

        let mut summary = RecomputeSummary {
            accounts_reset,
            ..Default::default()
        };

        for document in documents {
            let document_id = document_id_text(&document);

            let transaction: Transaction = match from_document(document) {
                Ok(transaction) => transaction,
                Err(error) => {
                    tracing::warn!("skipping unreadable transaction {document_id}: {error}");
                    summary.skipped += 1;
                    continue;
                }
            };

            match self
                .apply_transaction_delta(&transaction, BalanceChange::Apply)
                .await
            {
                Ok(()) => summary.applied += 1,
                Err(error) => {
                    tracing::warn!("skipping transaction {}: {error}", transaction.id);
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            "recomputed balances: {} accounts reset, {} transactions applied, {} skipped",
            summary.accounts_reset,
            summary.applied,
            summary.skipped
        );

        Ok(summary)
    }
}

fn zero_balance() -> Document {
    let mut fields = Document::new();
    fields.insert(BALANCE_FIELD.to_owned(), json!(0));
    fields
}

fn document_id_text(document: &Document) -> String {
    match document.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        _ => "<unknown>".to_owned(),
    }
}

#[cfg(test)]
mod ledger_tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use crate::{
        Error,
        document_id::DocumentId,
        ledger::core::{BalanceChange, Ledger, RecomputeSummary},
        store::{Collection, DocumentStore, SqliteDocumentStore, find_one, to_document},
        transaction::{Transaction, TransactionData},
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn get_test_ledger() -> (SqliteDocumentStore, Ledger<SqliteDocumentStore>) {
        let store = SqliteDocumentStore::open_in_memory().expect("could not open store");
        let ledger = Ledger::new(store.clone(), TIMEOUT);

        (store, ledger)
    }

    #[track_caller]
    fn must_transaction(
        amount: f64,
        transaction_type: &str,
        account_id: Option<DocumentId>,
    ) -> Transaction {
        let data: TransactionData = serde_json::from_value(json!({
            "amount": amount,
            "date": "2024-03-05",
            "type": transaction_type,
            "account_id": account_id,
        }))
        .expect("invalid test transaction");

        Transaction {
            id: DocumentId::new(),
            data,
        }
    }

    async fn must_insert(
        store: &SqliteDocumentStore,
        collection: Collection,
        value: Value,
    ) -> DocumentId {
        store
            .insert(collection, to_document(&value).unwrap(), TIMEOUT)
            .await
            .expect("could not insert document")
    }

    async fn must_get_balance(store: &SqliteDocumentStore, account_id: DocumentId) -> f64 {
        let account: Value = find_one(store, Collection::Accounts, account_id, TIMEOUT)
            .await
            .expect("could not get account");

        account["balance"].as_f64().expect("balance is not a number")
    }

    #[tokio::test]
    async fn income_raises_and_expense_lowers_balance() {
        let (store, ledger) = get_test_ledger();
        let account_id = must_insert(&store, Collection::Accounts, json!({"balance": 10})).await;

        ledger
            .apply_transaction_delta(
                &must_transaction(100.0, "income", Some(account_id)),
                BalanceChange::Apply,
            )
            .await
            .unwrap();
        ledger
            .apply_transaction_delta(
                &must_transaction(30.0, "expense", Some(account_id)),
                BalanceChange::Apply,
            )
            .await
            .unwrap();

        assert_eq!(must_get_balance(&store, account_id).await, 80.0);
    }

    #[tokio::test]
    async fn reverse_undoes_apply() {
        let (store, ledger) = get_test_ledger();
        let account_id = must_insert(&store, Collection::Accounts, json!({"balance": 50})).await;
        let transaction = must_transaction(12.5, "expense", Some(account_id));

        ledger
            .apply_transaction_delta(&transaction, BalanceChange::Apply)
            .await
            .unwrap();
        assert_eq!(must_get_balance(&store, account_id).await, 37.5);

        ledger
            .apply_transaction_delta(&transaction, BalanceChange::Reverse)
            .await
            .unwrap();
        assert_eq!(must_get_balance(&store, account_id).await, 50.0);
    }

    #[tokio::test]
    async fn transaction_without_account_is_an_error() {
        let (store, ledger) = get_test_ledger();
        let account_id = must_insert(&store, Collection::Accounts, json!({"balance": 5})).await;
        let transaction = must_transaction(100.0, "income", None);

        let result = ledger
            .apply_transaction_delta(&transaction, BalanceChange::Apply)
            .await;

        assert_eq!(result, Err(Error::NoAssociatedAccount(transaction.id)));
        assert_eq!(must_get_balance(&store, account_id).await, 5.0);
    }

    #[tokio::test]
    async fn missing_account_is_an_error() {
        let (_, ledger) = get_test_ledger();
        let missing_id = DocumentId::new();

        let result = ledger
            .apply_transaction_delta(
                &must_transaction(1.0, "income", Some(missing_id)),
                BalanceChange::Apply,
            )
            .await;

        assert_eq!(result, Err(Error::AccountNotFound(missing_id)));
    }

    #[tokio::test]
    async fn recompute_replays_history_and_skips_bad_records() {
        let (store, ledger) = get_test_ledger();
        let account_id = must_insert(
            &store,
            Collection::Accounts,
            json!({"name": "Main", "balance": 999}),
        )
        .await;
        let account = json!(account_id);
        must_insert(
            &store,
            Collection::Transactions,
            json!({"amount": 100, "date": "2024-03-01T00:00:00Z", "type": "income", "account_id": account}),
        )
        .await;
        must_insert(
            &store,
            Collection::Transactions,
            json!({"amount": 30, "date": "2024-03-02T00:00:00Z", "type": "expense", "account_id": account}),
        )
        .await;
        must_insert(
            &store,
            Collection::Transactions,
            json!({"amount": "lots", "date": "2024-03-03T00:00:00Z", "type": "expense", "account_id": account}),
        )
        .await;
        must_insert(
            &store,
            Collection::Transactions,
            json!({"amount": 5, "date": "2024-03-04T00:00:00Z", "type": "expense"}),
        )
        .await;

        let summary = ledger.recompute_all_balances().await.unwrap();

        assert_eq!(
            summary,
            RecomputeSummary {
                accounts_reset: 1,
                applied: 2,
                skipped: 2,
            }
        );
        assert_eq!(must_get_balance(&store, account_id).await, 70.0);
    }

    #[tokio::test]
    async fn recompute_is_idempotent() {
        let (store, ledger) = get_test_ledger();
        let account_id = must_insert(&store, Collection::Accounts, json!({"balance": 0})).await;
        must_insert(
            &store,
            Collection::Transactions,
            json!({"amount": 42, "date": "2024-03-01", "type": "income", "account_id": account_id}),
        )
        .await;

        ledger.recompute_all_balances().await.unwrap();
        ledger.recompute_all_balances().await.unwrap();

        assert_eq!(must_get_balance(&store, account_id).await, 42.0);
    }

    #[tokio::test]
    async fn recompute_waits_for_write_in_progress() {
        let (store, ledger) = get_test_ledger();
        must_insert(&store, Collection::Accounts, json!({"balance": 3})).await;
        let write_guard = ledger.begin_write().await;

        let mut recompute = tokio::spawn({
            let ledger = ledger.clone();
            async move { ledger.recompute_all_balances().await }
        });

        assert!(
            tokio::time::timeout(Duration::from_millis(100), &mut recompute)
                .await
                .is_err(),
            "recompute finished while a write was in progress"
        );

        drop(write_guard);
        let summary = tokio::time::timeout(TIMEOUT, recompute)
            .await
            .expect("recompute did not finish after the write")
            .expect("recompute task panicked")
            .unwrap();

        assert_eq!(summary.accounts_reset, 1);
    }

    #[tokio::test]
    async fn recompute_zeroes_accounts_without_transactions() {
        let (store, ledger) = get_test_ledger();
        let account_id = must_insert(&store, Collection::Accounts, json!({"balance": -12})).await;

        let summary = ledger.recompute_all_balances().await.unwrap();

        assert_eq!(summary.applied, 0);
        assert_eq!(must_get_balance(&store, account_id).await, 0.0);
    }
}

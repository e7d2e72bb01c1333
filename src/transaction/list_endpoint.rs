//! Endpoints for reading transactions.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::{
    Error,
    document_id::DocumentId,
    report::{FilterValue, coerce_filter_value},
    store::{
        Collection, Filter,
        query::{ComparisonOperator, Condition},
        find_all, find_one,
    },
    transaction::{Transaction, TransactionState},
};

/// The optional date range for listing transactions.
///
/// Each bound is an RFC 3339 timestamp or a plain `YYYY-MM-DD` date. Plain
/// dates cover the whole day.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    /// Only include transactions on or after this date.
    pub start_date: Option<String>,
    /// Only include transactions on or before this date.
    pub end_date: Option<String>,
}

/// List transactions, optionally restricted to a date range.
pub async fn list_transactions_endpoint(
    State(state): State<TransactionState>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let filter = date_range_filter(&query)?;

    find_all(&state.store, Collection::Transactions, &filter, state.timeout)
        .await
        .map(Json)
}

/// Get a single transaction.
pub async fn get_transaction_endpoint(
    State(state): State<TransactionState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<Transaction>, Error> {
    let transaction_id = DocumentId::parse(&transaction_id)?;

    find_one(
        &state.store,
        Collection::Transactions,
        transaction_id,
        state.timeout,
    )
    .await
    .map(Json)
}

fn date_range_filter(query: &DateRangeQuery) -> Result<Filter, Error> {
    let bounds = [
        (&query.start_date, ComparisonOperator::Gte),
        (&query.end_date, ComparisonOperator::Lte),
    ];

    let mut filter = Filter::all();
    for (bound, operator) in bounds {
        let Some(bound) = bound else {
            continue;
        };

        let operand = coerce_filter_value("date", &FilterValue::String(bound.clone()), operator)?;
        filter.push("date", Condition { operator, operand });
    }

    Ok(filter)
}

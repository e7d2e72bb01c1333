//! The report endpoint: compile a request and run it against the transactions.

use std::time::Duration;

use axum::{
    Json,
    extract::{FromRef, State},
};

use crate::{
    AppState, Error,
    json::JsonBody,
    report::{pipeline::build_pipeline, request::AggregationRequest},
    store::{Collection, Document, DocumentStore, SqliteDocumentStore},
};

/// The state needed to run a report.
#[derive(Debug, Clone)]
pub struct ReportState {
    /// The store holding the transactions.
    pub store: SqliteDocumentStore,
    /// The upper bound on the time the store may take to run the report.
    pub timeout: Duration,
}

impl FromRef<AppState> for ReportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            timeout: state.config.timeouts.report,
        }
    }
}

/// Compile the report request and return the aggregated rows.
///
/// The rows are returned as the store produced them. An empty result is `[]`.
pub async fn create_report_endpoint(
    State(state): State<ReportState>,
    JsonBody(request): JsonBody<AggregationRequest>,
) -> Result<Json<Vec<Document>>, Error> {
    let pipeline = build_pipeline(&request)?;

    let rows = state
        .store
        .aggregate(Collection::Transactions, &pipeline, state.timeout)
        .await
        .inspect_err(|error| tracing::error!("could not run report: {error}"))?;

    Ok(Json(rows))
}

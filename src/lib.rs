//! A personal finance record keeper.
//!
//! This library provides a JSON API for managing transactions, accounts and
//! categories, an ad-hoc report endpoint that compiles a declarative request
//! into an aggregation pipeline, and the ledger that keeps account balances
//! consistent with the transaction history.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

pub mod account;
mod app_state;
mod auth;
pub mod category;
pub mod config;
pub mod date;
pub mod document_id;
pub mod endpoints;
mod json;
pub mod ledger;
mod logging;
pub mod report;
mod routing;
pub mod store;
pub mod transaction;

pub use app_state::AppState;
pub use auth::{API_KEY_HEADER, api_key_guard};
pub use config::{AppConfig, Timeouts};
pub use document_id::DocumentId;
pub use ledger::{DEFAULT_RECALCULATION_INTERVAL, spawn_balance_recalculation};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;
pub use store::SqliteDocumentStore;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A report filter used an operator other than eq, ne, gt, gte, lt, lte, in or nin.
    #[error("unsupported operator \"{0}\"")]
    UnsupportedOperator(String),

    /// A report filter value does not fit its field and operator.
    #[error("invalid value for field \"{field}\" with operator {operator}: {reason}")]
    InvalidFilterValue {
        /// The filtered field.
        field: String,
        /// The store token of the operator, e.g. `$in`.
        operator: &'static str,
        /// What was wrong with the value.
        reason: String,
    },

    /// A `date:<part>` group key named a part other than year, month or day.
    #[error("unsupported date part \"{0}\", expected year, month or day")]
    UnsupportedDatePart(String),

    /// A sum or avg metric did not name the field to aggregate.
    #[error("metric \"{metric}\" uses {operation} and needs a field")]
    MissingMetricField {
        /// The name of the metric.
        metric: String,
        /// The requested operation.
        operation: String,
    },

    /// A metric used an operation other than sum, count or avg.
    #[error("metric \"{metric}\" uses unsupported operation \"{operation}\"")]
    UnsupportedMetricOperation {
        /// The name of the metric.
        metric: String,
        /// The requested operation.
        operation: String,
    },

    /// Two output columns of a report would have the same name.
    #[error("output field \"{0}\" is defined more than once")]
    DuplicateOutputField(String),

    /// The report request is structurally incomplete.
    #[error("invalid report request: {0}")]
    InvalidReportRequest(String),

    /// A report sorted on a field that is not one of its output columns.
    #[error("cannot sort by \"{0}\", it is not a group key or metric")]
    UnresolvableSortField(String),

    /// A report sort direction was something other than 1 or -1.
    #[error("sort direction for \"{field}\" must be 1 or -1, got {direction}")]
    InvalidSortDirection {
        /// The sorted field.
        field: String,
        /// The direction as sent.
        direction: String,
    },

    /// A balance change was requested for a transaction that has no account.
    #[error("transaction {0} has no associated account")]
    NoAssociatedAccount(DocumentId),

    /// A transaction refers to an account that does not exist.
    #[error("account {0} does not exist")]
    AccountNotFound(DocumentId),

    /// A string could not be parsed as a document ID.
    #[error("\"{0}\" is not a valid ID")]
    InvalidId(String),

    /// The client sent a body or field that failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// A document could not be converted to or from JSON.
    #[error("could not serialize document: {0}")]
    Serialization(String),

    /// A store operation did not finish in time.
    #[error("the database did not respond within {0:?}")]
    Timeout(Duration),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// A blocking database task panicked or was cancelled.
    #[error("a background task failed: {0}")]
    BackgroundTask(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Serialization(value.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UnsupportedOperator(_)
            | Error::InvalidFilterValue { .. }
            | Error::UnsupportedDatePart(_)
            | Error::MissingMetricField { .. }
            | Error::UnsupportedMetricOperation { .. }
            | Error::DuplicateOutputField(_)
            | Error::InvalidReportRequest(_)
            | Error::UnresolvableSortField(_)
            | Error::InvalidSortDirection { .. }
            | Error::InvalidId(_)
            | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NoAssociatedAccount(_) | Error::AccountNotFound(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An unexpected error occurred, check the server logs for more details."
                    })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

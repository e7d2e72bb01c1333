//! Defines the core data models for transactions.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, date::deserialize_client_date, document_id::DocumentId};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money was earned or spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money earned, raises the account balance.
    Income,
    /// Money spent, lowers the account balance.
    Expense,
}

/// An expense or income, i.e. an event where money was either spent or earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    #[serde(alias = "_id")]
    pub id: DocumentId,
    /// Everything about the transaction except its ID.
    #[serde(flatten)]
    pub data: TransactionData,
}

impl Transaction {
    /// The effect of the transaction on its account's balance.
    ///
    /// The sign comes from the transaction type, never from the amount.
    pub fn signed_amount(&self) -> f64 {
        match self.data.transaction_type {
            TransactionType::Income => self.data.amount,
            TransactionType::Expense => -self.data.amount,
        }
    }
}

/// The fields of a transaction as sent by clients and kept in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    /// The amount of money spent or earned. Never negative.
    pub amount: f64,
    /// When the transaction happened.
    ///
    /// Clients may send a plain `YYYY-MM-DD` date, which is read as midnight UTC.
    #[serde(
        deserialize_with = "deserialize_client_date",
        serialize_with = "time::serde::rfc3339::serialize"
    )]
    pub date: OffsetDateTime,
    /// A text description of what the transaction was for.
    #[serde(default)]
    pub description: String,
    /// The ID of the category the transaction belongs to.
    #[serde(default)]
    pub category_id: Option<DocumentId>,
    /// Whether the transaction is income or an expense.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The account whose balance the transaction affects.
    #[serde(default)]
    pub account_id: Option<DocumentId>,
    /// When the transaction was first recorded. Set by the server.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    /// When the transaction was last changed. Set by the server.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl TransactionData {
    /// Check the client supplied fields.
    ///
    /// # Errors
    /// Returns [Error::InvalidInput] if the amount is negative or not a finite number.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(Error::InvalidInput(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }

        Ok(())
    }
}

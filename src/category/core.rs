//! Defines the category model.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, document_id::DocumentId, transaction::TransactionType};

/// A label grouping transactions of one kind, e.g. "Groceries" for expenses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The ID of the category.
    #[serde(alias = "_id")]
    pub id: DocumentId,
    /// Everything about the category except its ID.
    #[serde(flatten)]
    pub data: CategoryData,
}

/// The fields of a category as sent by clients and kept in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryData {
    /// The display name of the category.
    pub name: String,
    /// Whether the category is for income or expenses.
    #[serde(rename = "type")]
    pub category_type: TransactionType,
    /// A longer explanation of what belongs in the category.
    #[serde(default)]
    pub description: Option<String>,
    /// An optional display color, e.g. `#ff8800`.
    #[serde(default)]
    pub color: Option<String>,
    /// When the category was created. Set by the server.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    /// When the category was last changed. Set by the server.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl CategoryData {
    /// Check the client supplied fields.
    ///
    /// # Errors
    /// Returns [Error::InvalidInput] if the name is blank.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "category name cannot be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

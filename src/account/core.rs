//! Defines the account model.

use serde::{Deserialize, Serialize};

use crate::{Error, document_id::DocumentId};

/// The kind of place money is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Cash on hand.
    Wallet,
    /// A bank account.
    Bank,
    /// A credit card, which has a statement closure day.
    CreditCard,
}

/// A wallet, bank account or credit card and its current balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The ID of the account.
    #[serde(alias = "_id")]
    pub id: DocumentId,
    /// The client editable fields.
    #[serde(flatten)]
    pub data: AccountData,
    /// The balance, maintained by the ledger from the account's transactions.
    #[serde(default)]
    pub balance: f64,
}

/// The fields of an account that clients may set.
///
/// The balance is not one of them; only the ledger changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountData {
    /// The display name of the account.
    pub name: String,
    /// What kind of account this is.
    #[serde(rename = "type")]
    pub account_type: AccountType,
    /// An optional display color, e.g. `#ff8800`.
    #[serde(default)]
    pub color: Option<String>,
    /// The day of the month a credit card statement closes.
    #[serde(default)]
    pub closure_day: Option<u8>,
    /// The day of the month the statement must be paid.
    #[serde(default)]
    pub payday: Option<u8>,
}

impl AccountData {
    /// Check the client supplied fields.
    ///
    /// # Errors
    /// Returns [Error::InvalidInput] if:
    /// - the name is blank
    /// - a day is outside 1 to 31
    /// - a payday is given without a closure day
    /// - a credit card has no closure day
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("account name cannot be empty".to_owned()));
        }

        for (label, day) in [("closure_day", self.closure_day), ("payday", self.payday)] {
            if let Some(day) = day
                && !(1..=31).contains(&day)
            {
                return Err(Error::InvalidInput(format!(
                    "{label} must be between 1 and 31, got {day}"
                )));
            }
        }

        if self.payday.is_some() && self.closure_day.is_none() {
            return Err(Error::InvalidInput(
                "payday requires a closure_day".to_owned(),
            ));
        }

        if self.account_type == AccountType::CreditCard && self.closure_day.is_none() {
            return Err(Error::InvalidInput(
                "a credit card account requires a closure_day".to_owned(),
            ));
        }

        Ok(())
    }
}

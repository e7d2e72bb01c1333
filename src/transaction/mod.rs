//! Transaction management.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and the client facing `TransactionData`
//! - The JSON endpoints for listing, creating, editing and deleting
//!   transactions, which keep account balances in step through the ledger

mod core;
mod create_endpoint;
mod delete_endpoint;
mod edit_endpoint;
mod list_endpoint;
mod state;

pub use core::{Transaction, TransactionData, TransactionType};
pub use create_endpoint::create_transaction_endpoint;
pub use delete_endpoint::delete_transaction_endpoint;
pub use edit_endpoint::edit_transaction_endpoint;
pub use list_endpoint::{DateRangeQuery, get_transaction_endpoint, list_transactions_endpoint};
pub use state::TransactionState;

#[cfg(test)]
pub(crate) use state::get_test_transaction_state;

//! Accounts: wallets, bank accounts and credit cards.

mod core;
mod endpoints;

pub use core::{Account, AccountData, AccountType};
pub use endpoints::{
    AccountState, create_account_endpoint, delete_account_endpoint, edit_account_endpoint,
    get_account_endpoint, list_accounts_endpoint,
};

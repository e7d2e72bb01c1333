//! Categories that label transactions as a kind of income or expense.

mod core;
mod endpoints;

pub use core::{Category, CategoryData};
pub use endpoints::{
    CategoryState, create_category_endpoint, delete_category_endpoint, edit_category_endpoint,
    list_categories_endpoint,
};

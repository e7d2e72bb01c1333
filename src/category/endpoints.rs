//! The JSON endpoints for managing categories.

use std::time::Duration;

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    category::{Category, CategoryData},
    document_id::DocumentId,
    json::{Created, JsonBody, message},
    store::{
        Collection, DocumentStore, Filter, SqliteDocumentStore, find_all, find_one, to_document,
    },
};

/// The state needed to manage categories.
#[derive(Debug, Clone)]
pub struct CategoryState {
    /// The store holding the categories.
    pub store: SqliteDocumentStore,
    /// The upper bound on each store call.
    pub timeout: Duration,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            timeout: state.config.timeouts.database,
        }
    }
}

/// List every category.
pub async fn list_categories_endpoint(
    State(state): State<CategoryState>,
) -> Result<Json<Vec<Category>>, Error> {
    find_all(&state.store, Collection::Categories, &Filter::all(), state.timeout)
        .await
        .map(Json)
}

/// Create a category.
pub async fn create_category_endpoint(
    State(state): State<CategoryState>,
    JsonBody(data): JsonBody<CategoryData>,
) -> Result<(StatusCode, Json<Created>), Error> {
    data.validate()?;

    let now = OffsetDateTime::now_utc();
    let data = CategoryData {
        created_at: Some(now),
        updated_at: Some(now),
        ..data
    };

    let id = state
        .store
        .insert(Collection::Categories, to_document(&data)?, state.timeout)
        .await?;

    Ok((StatusCode::CREATED, Json(Created { id })))
}

/// Replace a category, keeping its creation time.
pub async fn edit_category_endpoint(
    State(state): State<CategoryState>,
    Path(category_id): Path<String>,
    JsonBody(data): JsonBody<CategoryData>,
) -> Result<Json<Value>, Error> {
    let category_id = DocumentId::parse(&category_id)?;
    data.validate()?;

    let old: Category = find_one(
        &state.store,
        Collection::Categories,
        category_id,
        state.timeout,
    )
    .await?;
    let data = CategoryData {
        created_at: old.data.created_at,
        updated_at: Some(OffsetDateTime::now_utc()),
        ..data
    };

    let matched = state
        .store
        .update_by_id(
            Collection::Categories,
            category_id,
            to_document(&data)?,
            state.timeout,
        )
        .await?;
    if !matched {
        return Err(Error::NotFound);
    }

    Ok(message("category updated"))
}

/// Delete a category. Transactions referring to it are kept.
pub async fn delete_category_endpoint(
    State(state): State<CategoryState>,
    Path(category_id): Path<String>,
) -> Result<Json<Value>, Error> {
    let category_id = DocumentId::parse(&category_id)?;

    let deleted = state
        .store
        .delete_by_id(Collection::Categories, category_id, state.timeout)
        .await?;
    if !deleted {
        return Err(Error::NotFound);
    }

    Ok(message("category deleted"))
}

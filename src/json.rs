//! JSON request and response bodies shared by the API endpoints.

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Error, document_id::DocumentId};

/// Like [axum::Json] but a malformed body becomes [Error::InvalidInput], so
/// clients get the same `{"error": ...}` shape as every other failure.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

/// The body returned after a document was created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Created {
    /// The ID the store assigned to the new document.
    pub id: DocumentId,
}

/// A body carrying a short confirmation, e.g. `{"message": "account deleted"}`.
pub fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

//! API key authentication for the `/api` routes.

use axum::{
    extract::{FromRef, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::AppState;

/// The request header that carries the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The state needed for the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthState {
    /// The token clients must present. `None` refuses every request.
    pub api_token: Option<String>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            api_token: state.config.api_token.clone(),
        }
    }
}

/// Middleware that lets a request through only if its `x-api-key` header
/// matches the configured token. Otherwise responds with 401 Unauthorized.
pub async fn api_key_guard(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        tracing::error!("rejecting request because no API token is configured");
        return unauthorized("server configuration error, auth token not set");
    };

    let Some(provided) = request.headers().get(API_KEY_HEADER) else {
        return unauthorized("missing api key");
    };

    if provided.as_bytes() != expected.as_bytes() {
        tracing::warn!("rejecting request to {} with an invalid api key", request.uri());
        return unauthorized("invalid api key");
    }

    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, axum::Json(json!({ "error": message }))).into_response()
}

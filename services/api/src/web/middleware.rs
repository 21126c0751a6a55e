//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;
use crate::web::ErrorResponse;
use circulation_core::domain::Principal;
use circulation_core::ports::StoreError;

/// Middleware that resolves the bearer token to a [`Principal`] (user id
/// plus role set) and stores it in the request extensions.
///
/// The token must have been written by the identity platform; this service
/// never mints or verifies credentials itself. Missing, malformed, unknown
/// or expired tokens are rejected with 401.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ErrorResponse> {
    // 1. Extract the Authorization header
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(unauthorized)?;

    // 2. It must carry a bearer token
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(unauthorized)?;

    // 3. Resolve the token to a user id
    let user_id = state.store.resolve_token(token).await.map_err(|e| match e {
        StoreError::NotFound(_) => unauthorized(),
        other => {
            error!("Failed to resolve session token: {:?}", other);
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    })?;

    // 4. Load the user's roles; users without role rows are plain members
    let roles = state.store.roles_for_user(user_id).await.map_err(|e| {
        error!("Failed to load roles for {}: {:?}", user_id, e);
        ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    })?;

    // 5. Hand the principal to the handler
    req.extensions_mut().insert(Principal { user_id, roles });

    Ok(next.run(req).await)
}

fn unauthorized() -> ErrorResponse {
    ErrorResponse::new(StatusCode::UNAUTHORIZED, "Unauthorized")
}

//! # Bearer Authentication
//!
//! Middleware for the user-facing routes: extract the bearer token, verify
//! the HS256 signature, resolve the embedded username to a userid, and
//! attach the caller to the request.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use dcalc_shared::errors::AuthError;
use dcalc_shared::models::User;

use super::{ApiError, AppState};

/// The authenticated caller, attached as a request extension.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub(crate) fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingBearer)?;
    let token = bearer_token(header_value).ok_or(AuthError::MissingBearer)?;

    let username = state.jwt.verify(token)?;
    let user_id = User::id_for_username(state.context.database_pool(), &username)
        .await
        .map_err(|error| ApiError::Internal(error.to_string()))?
        .ok_or(AuthError::UnknownUser)?;

    request
        .extensions_mut()
        .insert(CurrentUser {
            id: user_id,
            username,
        });
    Ok(next.run(request).await)
}

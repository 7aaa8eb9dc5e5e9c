//! # HTTP API
//!
//! Request-scoped surface of the orchestrator: expression submission and
//! queries, per-user operator timeouts, worker heartbeats and liveness.
//! User-facing routes sit behind the bearer-token middleware; agent and
//! account routes are open.

pub mod auth;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::error;

use dcalc_shared::auth::JwtKeys;
use dcalc_shared::errors::{AuthError, DcalcError};
use dcalc_shared::SystemContext;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub context: Arc<SystemContext>,
    pub jwt: Arc<JwtKeys>,
}

/// Build the full route tree.
pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/addExpression", post(handlers::add_expression))
        .route("/getExpressionsList", get(handlers::list_expressions))
        .route("/getExpressionByID", get(handlers::expression_by_id))
        .route("/setOperationsTimeout", post(handlers::set_operation_timeouts))
        .route("/getOperationsTimeout", get(handlers::get_operation_timeouts))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .merge(authenticated)
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/getHearthbeat", post(handlers::receive_heartbeat))
        .route("/getWorkersStatus", get(handlers::workers_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler-facing error mapped onto a status code and a plain-text body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(body) => (StatusCode::BAD_REQUEST, body),
            ApiError::Unauthorized(body) => (StatusCode::UNAUTHORIZED, body),
            ApiError::NotFound(body) => (StatusCode::NOT_FOUND, body),
            ApiError::Internal(body) => {
                error!(error = %body, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        ApiError::Unauthorized(error.to_string())
    }
}

impl From<DcalcError> for ApiError {
    fn from(error: DcalcError) -> Self {
        match error {
            DcalcError::Auth(auth) => auth.into(),
            DcalcError::InvalidExpression(invalid) => ApiError::BadRequest(invalid.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

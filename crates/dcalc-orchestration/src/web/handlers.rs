//! # Handlers
//!
//! One function per endpoint. Handlers validate, delegate to the store and
//! the broker, and map failures through [`ApiError`]. The distributor owns
//! every state transition past NEW; nothing here mutates operation state.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;
use uuid::Uuid;

use dcalc_shared::auth::{hash_password, verify_password};
use dcalc_shared::config::DEFAULT_OPERATOR_DELAY;
use dcalc_shared::errors::AuthError;
use dcalc_shared::expr;
use dcalc_shared::messaging::{HeartbeatPayload, WorkerStatus};
use dcalc_shared::models::{Expression, Operator, User};

use super::auth::CurrentUser;
use super::types::{
    AddExpressionRequest, Credentials, ExpressionQuery, RegisteredResponse, TimeoutsBody,
    TokenResponse, WorkerStatusEntry,
};
use super::{ApiError, AppState};

const DUPLICATE_EXPRESSION_BODY: &str = "Expression exist in database";

pub async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    if credentials.login.is_empty() || credentials.password.is_empty() {
        return Err(ApiError::BadRequest(
            "login and password must not be empty".into(),
        ));
    }

    let password = credentials.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|error| ApiError::Internal(error.to_string()))?
        .map_err(|error| ApiError::Internal(error.to_string()))?;

    let user = match User::create(state.context.database_pool(), &credentials.login, &hash).await
    {
        Ok(user) => user,
        Err(error) if error.is_unique_violation() => {
            return Err(ApiError::BadRequest("user already exists".into()));
        }
        Err(error) => return Err(error.into()),
    };

    state
        .context
        .broker()
        .seed_default_timeouts(user.id, DEFAULT_OPERATOR_DELAY)
        .await?;

    info!(username = %user.username, "registered user");
    Ok(Json(RegisteredResponse {
        id: user.id,
        username: user.username,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let user = User::find_by_username(state.context.database_pool(), &credentials.login)
        .await?
        .ok_or(AuthError::WrongCredentials)?;

    let password = credentials.password;
    let hash = user.hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|error| ApiError::Internal(error.to_string()))?
        .map_err(|error| ApiError::Internal(error.to_string()))?;
    if !verified {
        return Err(AuthError::WrongCredentials.into());
    }

    let token = state.jwt.issue(&user.username)?;
    Ok(Json(TokenResponse { token }))
}

pub async fn add_expression(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(body): Json<AddExpressionRequest>,
) -> Result<Response, ApiError> {
    let sanitized =
        expr::validate(&body.expression).map_err(|error| ApiError::BadRequest(error.to_string()))?;

    // A client-supplied request id makes resubmission idempotent.
    let expression_id = headers
        .get("X-Request-Id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let pool = state.context.database_pool();
    match Expression::insert(pool, &expression_id, &sanitized, user.id).await {
        Ok(()) => {}
        Err(error) if error.is_unique_violation() => {
            return Ok((StatusCode::OK, DUPLICATE_EXPRESSION_BODY).into_response());
        }
        Err(error) => return Err(error.into()),
    }

    info!(expression_id = %expression_id, user_id = user.id, "accepted expression");
    let stored = Expression::find_for_user(pool, &expression_id, user.id)
        .await?
        .ok_or_else(|| ApiError::Internal("expression vanished after insert".into()))?;
    Ok(Json(stored).into_response())
}

pub async fn list_expressions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let expressions = Expression::list_for_user(state.context.database_pool(), user.id).await?;
    Ok(Json(expressions))
}

pub async fn expression_by_id(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ExpressionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let expression =
        Expression::find_for_user(state.context.database_pool(), &query.expression_id, user.id)
            .await?
            .ok_or_else(|| ApiError::NotFound("expression does not exist".into()))?;
    Ok(Json(expression))
}

pub async fn set_operation_timeouts(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<TimeoutsBody>,
) -> Result<impl IntoResponse, ApiError> {
    // Unknown operator keys are dropped, not rejected.
    let timeouts: HashMap<Operator, Duration> = body
        .iter()
        .filter_map(|(operator, seconds)| {
            Some((operator.parse::<Operator>().ok()?, Duration::from_secs(*seconds)))
        })
        .collect();
    state
        .context
        .broker()
        .set_operator_timeouts(user.id, &timeouts)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn get_operation_timeouts(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let timeouts = state.context.broker().operator_timeouts(user.id).await?;
    let body: TimeoutsBody = timeouts
        .into_iter()
        .map(|(operator, delay)| (operator.as_str().to_string(), delay.as_secs()))
        .collect();
    Ok(Json(body))
}

pub async fn receive_heartbeat(
    State(state): State<AppState>,
    Json(heartbeat): Json<HeartbeatPayload>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .context
        .broker()
        .record_heartbeat(&heartbeat.worker_name, heartbeat.in_flight_count)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn workers_status(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let broker = state.context.broker();
    let heartbeats = broker.worker_heartbeats().await?;
    let task_counts = broker.worker_task_counts().await?;

    let now = chrono::Utc::now();
    let mut workers: Vec<WorkerStatusEntry> = heartbeats
        .into_iter()
        .map(|(name, last_seen)| {
            let in_flight = task_counts.get(&name).copied().unwrap_or(0);
            WorkerStatusEntry {
                status: WorkerStatus::from_last_seen(last_seen, now).as_str(),
                in_flight,
                name,
            }
        })
        .collect();
    workers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(workers))
}

//! # Request and Response Bodies

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub id: i32,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AddExpressionRequest {
    pub expression: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpressionQuery {
    #[serde(rename = "expressionId")]
    pub expression_id: String,
}

/// Operator → whole seconds, in both directions of the timeout endpoints.
/// Unknown operator keys are silently dropped on write.
pub type TimeoutsBody = BTreeMap<String, u64>;

#[derive(Debug, Serialize)]
pub struct WorkerStatusEntry {
    pub name: String,
    pub status: &'static str,
    pub in_flight: i64,
}

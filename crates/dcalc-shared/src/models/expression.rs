//! # Expression
//!
//! A user-submitted infix arithmetic string and its evaluation record. The
//! API layer creates expressions; only the distributor mutates them
//! (decomposition → PARTITIONED/INVALID, promotion → DONE with result).

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::errors::DcalcResult;

/// Expression lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i16)]
pub enum ExpressionStatus {
    Invalid = -1,
    New = 0,
    Partitioned = 1,
    Done = 2,
}

impl TryFrom<i16> for ExpressionStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ExpressionStatus::Invalid),
            0 => Ok(ExpressionStatus::New),
            1 => Ok(ExpressionStatus::Partitioned),
            2 => Ok(ExpressionStatus::Done),
            other => Err(format!("unknown expression status {other}")),
        }
    }
}

impl Serialize for ExpressionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(*self as i16)
    }
}

impl<'de> Deserialize<'de> for ExpressionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i16::deserialize(deserializer)?;
        ExpressionStatus::try_from(raw).map_err(de::Error::custom)
    }
}

/// A submitted expression scoped to its owner.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Expression {
    #[sqlx(rename = "expressionid")]
    #[serde(rename = "expressionid")]
    pub expression_id: String,
    pub expression: String,
    pub status: ExpressionStatus,
    pub result: Option<f64>,
    #[sqlx(rename = "userid")]
    #[serde(skip_serializing)]
    pub user_id: i32,
}

const EXPRESSION_COLUMNS: &str = "expressionid, expression, status, result, userid";

impl Expression {
    /// Register a freshly submitted expression in NEW state. A duplicate id
    /// surfaces as a unique violation the caller treats as idempotent replay.
    pub async fn insert(
        pool: &PgPool,
        expression_id: &str,
        expression: &str,
        user_id: i32,
    ) -> DcalcResult<()> {
        sqlx::query(
            "INSERT INTO expressions (expressionid, expression, status, userid) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(expression_id)
        .bind(expression)
        .bind(ExpressionStatus::New)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_user(pool: &PgPool, user_id: i32) -> DcalcResult<Vec<Expression>> {
        let expressions = sqlx::query_as::<_, Expression>(&format!(
            "SELECT {EXPRESSION_COLUMNS} FROM expressions WHERE userid = $1",
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(expressions)
    }

    pub async fn find_for_user(
        pool: &PgPool,
        expression_id: &str,
        user_id: i32,
    ) -> DcalcResult<Option<Expression>> {
        let expression = sqlx::query_as::<_, Expression>(&format!(
            "SELECT {EXPRESSION_COLUMNS} FROM expressions \
             WHERE expressionid = $1 AND userid = $2",
        ))
        .bind(expression_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(expression)
    }

    /// Expressions awaiting decomposition, across all users.
    pub async fn unpartitioned(pool: &PgPool) -> DcalcResult<Vec<Expression>> {
        let expressions = sqlx::query_as::<_, Expression>(&format!(
            "SELECT {EXPRESSION_COLUMNS} FROM expressions WHERE status = $1",
        ))
        .bind(ExpressionStatus::New)
        .fetch_all(pool)
        .await?;
        Ok(expressions)
    }

    pub async fn set_status(
        pool: &PgPool,
        expression_id: &str,
        status: ExpressionStatus,
    ) -> DcalcResult<()> {
        sqlx::query("UPDATE expressions SET status = $1 WHERE expressionid = $2")
            .bind(status)
            .bind(expression_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_result(pool: &PgPool, expression_id: &str, result: f64) -> DcalcResult<()> {
        sqlx::query("UPDATE expressions SET result = $1 WHERE expressionid = $2")
            .bind(result)
            .bind(expression_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_smallint_values() {
        assert_eq!(ExpressionStatus::try_from(-1), Ok(ExpressionStatus::Invalid));
        assert_eq!(ExpressionStatus::try_from(2), Ok(ExpressionStatus::Done));
        assert!(ExpressionStatus::try_from(3).is_err());
    }

    #[test]
    fn serializes_without_owner() {
        let expression = Expression {
            expression_id: "abc".into(),
            expression: "2+3".into(),
            status: ExpressionStatus::Done,
            result: Some(5.0),
            user_id: 7,
        };
        let json = serde_json::to_value(&expression).unwrap();
        assert_eq!(json["expressionid"], "abc");
        assert_eq!(json["status"], 2);
        assert_eq!(json["result"], 5.0);
        assert!(json.get("user_id").is_none());
        assert!(json.get("userid").is_none());
    }
}

//! # Operation
//!
//! A single binary arithmetic step with two operand slots and one result.
//! Operations form a rooted binary tree per expression: `parent_id` names
//! either a sibling operation or, for the root, the owning expression id.
//! A `NULL` operand slot means the value is pending a child's result.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::DcalcResult;

/// Operation lifecycle states tracked in the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(i16)]
pub enum OperationStatus {
    Ready = 0,
    Running = 1,
    Done = 2,
}

impl TryFrom<i16> for OperationStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OperationStatus::Ready),
            1 => Ok(OperationStatus::Running),
            2 => Ok(OperationStatus::Done),
            other => Err(format!("unknown operation status {other}")),
        }
    }
}

impl Serialize for OperationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(*self as i16)
    }
}

impl<'de> Deserialize<'de> for OperationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i16::deserialize(deserializer)?;
        OperationStatus::try_from(raw).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operator: {0}")]
pub struct UnknownOperator(String);

/// The four supported binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub const ALL: [Operator; 4] = [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    pub fn from_char(c: char) -> Option<Operator> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            _ => None,
        }
    }

    /// Binding strength for infix-to-postfix conversion.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    /// Apply the operator in IEEE-754 binary64. Division by zero yields
    /// ±∞/NaN per IEEE semantics; the value is stored as-is.
    pub fn apply(&self, v1: f64, v2: f64) -> f64 {
        match self {
            Operator::Add => v1 + v2,
            Operator::Sub => v1 - v2,
            Operator::Mul => v1 * v2,
            Operator::Div => v1 / v2,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next().and_then(Operator::from_char), chars.next()) {
            (Some(op), None) => Ok(op),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// Persisted as a single character; delegate the postgres codec to String.

impl sqlx::Type<sqlx::Postgres> for Operator {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for Operator {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Operator {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <String as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
        Ok(raw.trim().parse::<Operator>()?)
    }
}

/// One binary arithmetic step owned by an expression.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Operation {
    #[sqlx(rename = "operationid")]
    pub operation_id: Uuid,
    pub operator: Operator,
    pub v1: Option<f64>,
    pub v2: Option<f64>,
    #[sqlx(rename = "expressionid")]
    pub expression_id: String,
    #[sqlx(rename = "parentid")]
    pub parent_id: String,
    pub left: bool,
    pub status: OperationStatus,
    pub result: Option<f64>,
    #[sqlx(rename = "changedtime")]
    pub changed_time: DateTime<Utc>,
}

/// A completed child's result routed into its parent's operand slot.
#[derive(Debug, Clone)]
pub struct ParentWrite {
    pub operation_id: Uuid,
    pub parent_id: Uuid,
    pub value: f64,
    pub left: bool,
}

const OPERATION_COLUMNS: &str = "operationid, operator, v1, v2, expressionid, parentid, \"left\", status, result, changedtime";

impl Operation {
    /// Whether this operation is the root of its expression's tree.
    pub fn is_root(&self) -> bool {
        self.parent_id == self.expression_id
    }

    /// Insert a decomposition batch. Re-running decomposition for the same
    /// expression must be a no-op, so id collisions are ignored.
    pub async fn bulk_insert(pool: &PgPool, operations: &[Operation]) -> DcalcResult<()> {
        let mut tx = pool.begin().await?;
        for op in operations {
            sqlx::query(
                "INSERT INTO operations \
                 (operationid, operator, v1, v2, expressionid, parentid, \"left\", status, changedtime) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (operationid) DO NOTHING",
            )
            .bind(op.operation_id)
            .bind(op.operator)
            .bind(op.v1)
            .bind(op.v2)
            .bind(&op.expression_id)
            .bind(&op.parent_id)
            .bind(op.left)
            .bind(op.status)
            .bind(op.changed_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Operations that can be dispatched: READY with both operands known.
    pub async fn ready(pool: &PgPool) -> DcalcResult<Vec<Operation>> {
        let ops = sqlx::query_as::<_, Operation>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations \
             WHERE status = $1 AND v1 IS NOT NULL AND v2 IS NOT NULL",
        ))
        .bind(OperationStatus::Ready)
        .fetch_all(pool)
        .await?;
        Ok(ops)
    }

    /// Ingested but not yet promoted: RUNNING with a result present.
    pub async fn completed(pool: &PgPool) -> DcalcResult<Vec<Operation>> {
        let ops = sqlx::query_as::<_, Operation>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations \
             WHERE status = $1 AND result IS NOT NULL",
        ))
        .bind(OperationStatus::Running)
        .fetch_all(pool)
        .await?;
        Ok(ops)
    }

    pub async fn set_status(
        pool: &PgPool,
        operation_id: Uuid,
        status: OperationStatus,
    ) -> DcalcResult<()> {
        sqlx::query("UPDATE operations SET status = $1, changedtime = now() WHERE operationid = $2")
            .bind(status)
            .bind(operation_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Flip a batch of operations to `status`, stamping the change time.
    pub async fn bulk_set_status(
        pool: &PgPool,
        operation_ids: &[Uuid],
        status: OperationStatus,
    ) -> DcalcResult<()> {
        if operation_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE operations SET status = $1, changedtime = now() WHERE operationid = ANY($2)",
        )
        .bind(status)
        .bind(operation_ids)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Write a received result. Idempotent per operation: last write wins.
    pub async fn set_result(pool: &PgPool, operation_id: Uuid, result: f64) -> DcalcResult<()> {
        sqlx::query("UPDATE operations SET result = $1 WHERE operationid = $2")
            .bind(result)
            .bind(operation_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Route completed children's results into their parents' operand slots,
    /// choosing `v1` or `v2` by the child's `left` flag.
    pub async fn write_results_to_parents(
        pool: &PgPool,
        writes: &[ParentWrite],
    ) -> DcalcResult<()> {
        let mut tx = pool.begin().await?;
        for write in writes {
            let query = if write.left {
                "UPDATE operations SET v1 = $1 WHERE operationid = $2"
            } else {
                "UPDATE operations SET v2 = $1 WHERE operationid = $2"
            };
            sqlx::query(query)
                .bind(write.value)
                .bind(write.parent_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Re-queue operations lost in flight: RUNNING without a result for
    /// longer than the timeout, plus DONE rows that never got a result (a
    /// lost promotion write).
    pub async fn reset_stuck(pool: &PgPool, cutoff: DateTime<Utc>) -> DcalcResult<u64> {
        let outcome = sqlx::query(
            "UPDATE operations SET status = $1, changedtime = now() \
             WHERE (status = $2 AND result IS NULL AND changedtime < $3) \
                OR (status = $4 AND result IS NULL)",
        )
        .bind(OperationStatus::Ready)
        .bind(OperationStatus::Running)
        .bind(cutoff)
        .bind(OperationStatus::Done)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected())
    }

    /// Resolve the userid owning an operation, through its expression.
    pub async fn owner_user_id(pool: &PgPool, operation_id: Uuid) -> DcalcResult<Option<i32>> {
        let user_id = sqlx::query_scalar::<_, i32>(
            "SELECT e.userid FROM operations o \
             JOIN expressions e ON o.expressionid = e.expressionid \
             WHERE o.operationid = $1",
        )
        .bind(operation_id)
        .fetch_optional(pool)
        .await?;
        Ok(user_id)
    }
}

//! # Promotion Loop
//!
//! Scans ingested-but-unpromoted operations (RUNNING with a result) and
//! propagates each result upward. Roots complete their expression;
//! non-roots fill their parent's waiting operand slot. Promotion is the only
//! event that can make a parent dispatchable, so readiness never races the
//! child's completion.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use dcalc_shared::errors::DcalcResult;
use dcalc_shared::models::{Expression, ExpressionStatus, Operation, OperationStatus, ParentWrite};
use dcalc_shared::SystemContext;

pub async fn run(context: Arc<SystemContext>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match tick(&context).await {
            Ok(0) => {}
            Ok(count) => info!(operations = count, "promoted operation results"),
            Err(error) => warn!(%error, "promotion tick failed"),
        }
    }
}

/// A finished root operation: its value completes the whole expression.
#[derive(Debug, Clone, PartialEq)]
pub struct RootCompletion {
    pub operation_id: Uuid,
    pub expression_id: String,
    pub value: f64,
}

/// Split completed operations into root completions and parent-slot writes.
/// Rows without a result or with an unparseable parent id are dropped (the
/// completed-scan query guarantees neither in practice).
pub fn partition_completed(completed: &[Operation]) -> (Vec<RootCompletion>, Vec<ParentWrite>) {
    let mut roots = Vec::new();
    let mut writes = Vec::new();
    for operation in completed {
        let Some(value) = operation.result else {
            continue;
        };
        if operation.is_root() {
            roots.push(RootCompletion {
                operation_id: operation.operation_id,
                expression_id: operation.expression_id.clone(),
                value,
            });
        } else {
            match operation.parent_id.parse::<Uuid>() {
                Ok(parent_id) => writes.push(ParentWrite {
                    operation_id: operation.operation_id,
                    parent_id,
                    value,
                    left: operation.left,
                }),
                Err(_) => warn!(
                    operation_id = %operation.operation_id,
                    parent_id = %operation.parent_id,
                    "non-root operation has a malformed parent id"
                ),
            }
        }
    }
    (roots, writes)
}

/// Promote every completed operation; returns how many were promoted.
pub async fn tick(context: &SystemContext) -> DcalcResult<usize> {
    let pool = context.database_pool();
    let completed = Operation::completed(pool).await?;
    if completed.is_empty() {
        return Ok(0);
    }

    let (roots, writes) = partition_completed(&completed);

    for root in &roots {
        Expression::set_result(pool, &root.expression_id, root.value).await?;
        Expression::set_status(pool, &root.expression_id, ExpressionStatus::Done).await?;
        Operation::set_status(pool, root.operation_id, OperationStatus::Done).await?;
        info!(
            expression_id = %root.expression_id,
            result = root.value,
            "expression completed"
        );
    }

    if !writes.is_empty() {
        Operation::write_results_to_parents(pool, &writes).await?;
        let promoted: Vec<Uuid> = writes.iter().map(|write| write.operation_id).collect();
        Operation::bulk_set_status(pool, &promoted, OperationStatus::Done).await?;
    }

    Ok(roots.len() + writes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dcalc_shared::models::Operator;

    fn completed_operation(expression_id: &str, parent_id: &str, left: bool) -> Operation {
        Operation {
            operation_id: Uuid::new_v4(),
            operator: Operator::Add,
            v1: Some(1.0),
            v2: Some(2.0),
            expression_id: expression_id.to_string(),
            parent_id: parent_id.to_string(),
            left,
            status: OperationStatus::Running,
            result: Some(3.0),
            changed_time: Utc::now(),
        }
    }

    #[test]
    fn roots_and_children_are_partitioned_by_parent_reference() {
        let parent = Uuid::new_v4();
        let ops = vec![
            completed_operation("expr-1", "expr-1", false),
            completed_operation("expr-1", &parent.to_string(), true),
        ];
        let (roots, writes) = partition_completed(&ops);

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].expression_id, "expr-1");
        assert_eq!(roots[0].value, 3.0);

        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].parent_id, parent);
        assert!(writes[0].left);
    }

    #[test]
    fn malformed_parent_ids_are_dropped() {
        let ops = vec![completed_operation("expr-1", "not-a-uuid", false)];
        let (roots, writes) = partition_completed(&ops);
        assert!(roots.is_empty());
        assert!(writes.is_empty());
    }

    #[test]
    fn resultless_rows_are_skipped() {
        let mut op = completed_operation("expr-1", "expr-1", false);
        op.result = None;
        let (roots, writes) = partition_completed(&[op]);
        assert!(roots.is_empty());
        assert!(writes.is_empty());
    }
}

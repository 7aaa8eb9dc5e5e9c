//! Store-backed lifecycle tests: decomposition inserts, readiness, result
//! promotion and stuck-operation recovery against a real Postgres schema.
//!
//! Run with a provisioned database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{TimeDelta, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dcalc_orchestration::distributor::promotion::partition_completed;
use dcalc_shared::expr;
use dcalc_shared::models::{
    Expression, ExpressionStatus, Operation, OperationStatus, User,
};

/// Register a user and submit one expression, returning the decomposed
/// operations already inserted into the store.
async fn seed_expression(pool: &PgPool, expression_id: &str, text: &str) -> Vec<Operation> {
    let user = User::create(pool, &format!("user-{expression_id}"), "hash")
        .await
        .expect("create user");
    Expression::insert(pool, expression_id, text, user.id)
        .await
        .expect("insert expression");
    let operations = expr::decompose(expression_id, text).expect("decompose");
    Operation::bulk_insert(pool, &operations).await.expect("bulk insert");
    Expression::set_status(pool, expression_id, ExpressionStatus::Partitioned)
        .await
        .expect("mark partitioned");
    operations
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn bulk_insert_is_idempotent(pool: PgPool) {
    let operations = seed_expression(&pool, "expr-idem", "(1+2)*4").await;

    // Re-running decomposition persistence must be a no-op.
    Operation::bulk_insert(&pool, &operations)
        .await
        .expect("second insert");
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM operations WHERE expressionid = $1")
        .bind("expr-idem")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count as usize, operations.len());
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn readiness_requires_both_operands(pool: PgPool) {
    let operations = seed_expression(&pool, "expr-ready", "(1+2)*4").await;
    let child = &operations[0];

    let ready = Operation::ready(&pool).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].operation_id, child.operation_id);
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn child_promotion_makes_the_parent_dispatchable(pool: PgPool) {
    let operations = seed_expression(&pool, "expr-promote", "(1+2)*4").await;
    let child = &operations[0];
    let root = &operations[1];

    // Simulated dispatch and agent result for the child.
    Operation::bulk_set_status(&pool, &[child.operation_id], OperationStatus::Running)
        .await
        .unwrap();
    Operation::set_result(&pool, child.operation_id, 3.0).await.unwrap();

    let completed = Operation::completed(&pool).await.unwrap();
    assert_eq!(completed.len(), 1);
    let (roots, writes) = partition_completed(&completed);
    assert!(roots.is_empty());
    assert_eq!(writes.len(), 1);

    Operation::write_results_to_parents(&pool, &writes).await.unwrap();
    Operation::bulk_set_status(&pool, &[child.operation_id], OperationStatus::Done)
        .await
        .unwrap();

    let ready = Operation::ready(&pool).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].operation_id, root.operation_id);
    assert_eq!(ready[0].v1, Some(3.0));
    assert_eq!(ready[0].v2, Some(4.0));
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn root_completion_finishes_the_expression(pool: PgPool) {
    let operations = seed_expression(&pool, "expr-root", "2+3").await;
    let root = &operations[0];

    Operation::bulk_set_status(&pool, &[root.operation_id], OperationStatus::Running)
        .await
        .unwrap();
    Operation::set_result(&pool, root.operation_id, 5.0).await.unwrap();

    let completed = Operation::completed(&pool).await.unwrap();
    let (roots, writes) = partition_completed(&completed);
    assert_eq!(roots.len(), 1);
    assert!(writes.is_empty());

    Expression::set_result(&pool, &roots[0].expression_id, roots[0].value)
        .await
        .unwrap();
    Expression::set_status(&pool, &roots[0].expression_id, ExpressionStatus::Done)
        .await
        .unwrap();
    Operation::set_status(&pool, roots[0].operation_id, OperationStatus::Done)
        .await
        .unwrap();

    let user_id: i32 = sqlx::query_scalar("SELECT userid FROM expressions WHERE expressionid = $1")
        .bind("expr-root")
        .fetch_one(&pool)
        .await
        .unwrap();
    let stored = Expression::find_for_user(&pool, "expr-root", user_id)
        .await
        .unwrap()
        .expect("expression exists");
    assert_eq!(stored.status, ExpressionStatus::Done);
    assert_eq!(stored.result, Some(5.0));
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn stuck_running_operations_are_requeued(pool: PgPool) {
    let operations = seed_expression(&pool, "expr-stuck", "5/5").await;
    let root = &operations[0];

    Operation::bulk_set_status(&pool, &[root.operation_id], OperationStatus::Running)
        .await
        .unwrap();
    // Backdate the status change to before the timeout window.
    sqlx::query("UPDATE operations SET changedtime = now() - interval '2 minutes'")
        .execute(&pool)
        .await
        .unwrap();

    let cutoff = Utc::now() - TimeDelta::seconds(60);
    let reset = Operation::reset_stuck(&pool, cutoff).await.unwrap();
    assert_eq!(reset, 1);

    let ready = Operation::ready(&pool).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].status, OperationStatus::Ready);
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn done_without_result_is_reset_as_a_safety_net(pool: PgPool) {
    let operations = seed_expression(&pool, "expr-safety", "2+3").await;
    let root = &operations[0];

    Operation::bulk_set_status(&pool, &[root.operation_id], OperationStatus::Done)
        .await
        .unwrap();

    let cutoff = Utc::now() - TimeDelta::seconds(60);
    let reset = Operation::reset_stuck(&pool, cutoff).await.unwrap();
    assert_eq!(reset, 1);
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn duplicate_expression_ids_surface_as_unique_violations(pool: PgPool) {
    let user = User::create(&pool, "dup-user", "hash").await.unwrap();
    Expression::insert(&pool, "expr-dup", "2+3", user.id).await.unwrap();

    let error = Expression::insert(&pool, "expr-dup", "2+3", user.id)
        .await
        .expect_err("second insert must collide");
    assert!(error.is_unique_violation());
}

#[sqlx::test(migrator = "dcalc_shared::database::MIGRATOR")]
#[ignore = "requires a provisioned Postgres"]
async fn owner_resolves_through_the_expression_join(pool: PgPool) {
    let operations = seed_expression(&pool, "expr-owner", "2+3").await;
    let root = &operations[0];

    let expected: i32 = sqlx::query_scalar("SELECT userid FROM expressions WHERE expressionid = $1")
        .bind("expr-owner")
        .fetch_one(&pool)
        .await
        .unwrap();
    let owner = Operation::owner_user_id(&pool, root.operation_id)
        .await
        .unwrap();
    assert_eq!(owner, Some(expected));

    let unknown = Operation::owner_user_id(&pool, Uuid::new_v4()).await.unwrap();
    assert_eq!(unknown, None);
}

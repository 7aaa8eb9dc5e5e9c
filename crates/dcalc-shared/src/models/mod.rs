//! # Task Store Models
//!
//! Records persisted in the task store, with their queries attached as
//! associated functions. Every function issues at most one short statement
//! or one small transaction; the distributor loops compose them into the
//! operation lifecycle.

pub mod expression;
pub mod operation;
pub mod user;

pub use expression::{Expression, ExpressionStatus};
pub use operation::{Operation, OperationStatus, Operator, ParentWrite};
pub use user::User;

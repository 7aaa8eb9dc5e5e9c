//! # Expression Decomposition
//!
//! Turns an infix arithmetic string into the dependency tree of binary
//! operations the distributor drives through the store. Two passes:
//! shunting-yard conversion to postfix, then postfix evaluation against a
//! value/operation stack that wires parent links as operations are
//! discovered.
//!
//! The operation list is an arena: child→parent references are ids, never
//! owning pointers, matching the persisted representation.

use chrono::Utc;
use uuid::Uuid;

use crate::errors::ExpressionError;
use crate::models::{Operation, OperationStatus, Operator};

/// Sanitize and validate a raw submission.
///
/// Whitespace is removed, characters outside `0-9 + - * / ( )` are
/// stripped, and parenthesis balance is checked by linear scan.
pub fn validate(raw: &str) -> Result<String, ExpressionError> {
    let sanitized: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')'))
        .collect();
    if sanitized.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut depth = 0usize;
    for c in sanitized.chars() {
        match c {
            '(' => depth += 1,
            ')' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return Err(ExpressionError::UnbalancedParentheses),
            },
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ExpressionError::UnbalancedParentheses);
    }
    Ok(sanitized)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(Operator),
}

/// Infix to postfix via shunting-yard. Multi-digit integer literals
/// accumulate until a non-digit; operators pop while the stack top binds at
/// least as tightly; parentheses group.
fn to_postfix(sanitized: &str) -> Result<Vec<Token>, ExpressionError> {
    #[derive(Debug, Clone, Copy)]
    enum StackEntry {
        Paren,
        Op(Operator),
    }

    let mut output = Vec::new();
    let mut stack: Vec<StackEntry> = Vec::new();
    let mut number = String::new();

    let mut flush_number = |output: &mut Vec<Token>, number: &mut String| {
        if !number.is_empty() {
            // Only ASCII digits accumulate here, so the parse cannot fail.
            let value: f64 = number.parse().unwrap_or_default();
            output.push(Token::Number(value));
            number.clear();
        }
    };

    for c in sanitized.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        flush_number(&mut output, &mut number);
        match c {
            '(' => stack.push(StackEntry::Paren),
            ')' => loop {
                match stack.pop() {
                    Some(StackEntry::Op(op)) => output.push(Token::Op(op)),
                    Some(StackEntry::Paren) => break,
                    None => return Err(ExpressionError::UnbalancedParentheses),
                }
            },
            _ => {
                // validate() strips everything else; tolerate stray input the
                // same way by dropping it.
                let Some(op) = Operator::from_char(c) else {
                    continue;
                };
                while let Some(StackEntry::Op(top)) = stack.last().copied() {
                    if top.precedence() >= op.precedence() {
                        output.push(Token::Op(top));
                        stack.pop();
                    } else {
                        break;
                    }
                }
                stack.push(StackEntry::Op(op));
            }
        }
    }
    flush_number(&mut output, &mut number);

    while let Some(entry) = stack.pop() {
        match entry {
            StackEntry::Op(op) => output.push(Token::Op(op)),
            StackEntry::Paren => return Err(ExpressionError::UnbalancedParentheses),
        }
    }
    Ok(output)
}

/// An operand on the evaluation stack: a concrete literal or a reference to
/// an already-built operation whose result is still pending.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Literal(f64),
    Node(usize),
}

#[derive(Debug)]
struct Node {
    operation_id: Uuid,
    operator: Operator,
    v1: Option<f64>,
    v2: Option<f64>,
    parent_id: String,
    left: bool,
}

/// Decompose a sanitized infix expression into its operation tree.
///
/// The returned list is in bottom-up discovery order. Exactly one operation
/// carries `parent_id == expression_id` (the root); every other operation's
/// parent is a sibling in the list. All operations start READY; an operand
/// slot is `None` exactly when it waits on a child's result.
pub fn decompose(
    expression_id: &str,
    sanitized: &str,
) -> Result<Vec<Operation>, ExpressionError> {
    let tokens = to_postfix(sanitized)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut nodes: Vec<Node> = Vec::new();
    let mut stack: Vec<Slot> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(value) => stack.push(Slot::Literal(value)),
            Token::Op(operator) => {
                let v2 = stack.pop().ok_or(ExpressionError::UnaryOperation)?;
                let v1 = stack.pop().ok_or(ExpressionError::UnaryOperation)?;
                if operator == Operator::Div {
                    if let Slot::Literal(divisor) = v2 {
                        if divisor == 0.0 {
                            return Err(ExpressionError::DivisionByZero);
                        }
                    }
                }

                let operation_id = Uuid::new_v4();
                let index = nodes.len();
                let mut wire = |slot: Slot, left: bool, nodes: &mut Vec<Node>| match slot {
                    Slot::Literal(value) => Some(value),
                    Slot::Node(child) => {
                        nodes[child].parent_id = operation_id.to_string();
                        nodes[child].left = left;
                        None
                    }
                };
                let v1 = wire(v1, true, &mut nodes);
                let v2 = wire(v2, false, &mut nodes);
                nodes.push(Node {
                    operation_id,
                    operator,
                    v1,
                    v2,
                    parent_id: expression_id.to_string(),
                    left: false,
                });
                stack.push(Slot::Node(index));
            }
        }
    }

    if nodes.is_empty() {
        // A bare literal (or nothing but parentheses) decomposes to no work.
        return Err(ExpressionError::NotEnoughValues);
    }
    if stack.len() != 1 {
        return Err(ExpressionError::DanglingOperands);
    }

    let now = Utc::now();
    Ok(nodes
        .into_iter()
        .map(|node| Operation {
            operation_id: node.operation_id,
            operator: node.operator,
            v1: node.v1,
            v2: node.v2,
            expression_id: expression_id.to_string(),
            parent_id: node.parent_id,
            left: node.left,
            status: OperationStatus::Ready,
            result: None,
            changed_time: now,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn decomposed(expr: &str) -> Vec<Operation> {
        let sanitized = validate(expr).expect("valid expression");
        decompose("expr-1", &sanitized).expect("decomposable expression")
    }

    /// Drive a decomposed tree the way the distributor would: execute any
    /// operation with both operands known, promote its result into the
    /// parent slot, and repeat until the root completes.
    fn run_to_completion(ops: &mut [Operation]) -> f64 {
        loop {
            let index = ops
                .iter()
                .position(|op| {
                    op.status != OperationStatus::Done && op.v1.is_some() && op.v2.is_some()
                })
                .expect("an executable operation must exist while the root is unfinished");
            let value = ops[index]
                .operator
                .apply(ops[index].v1.unwrap(), ops[index].v2.unwrap());
            ops[index].result = Some(value);
            ops[index].status = OperationStatus::Done;

            if ops[index].is_root() {
                return value;
            }
            let parent_id = ops[index].parent_id.clone();
            let left = ops[index].left;
            let parent = ops
                .iter_mut()
                .find(|op| op.operation_id.to_string() == parent_id)
                .expect("parent id resolves to a sibling");
            if left {
                parent.v1 = Some(value);
            } else {
                parent.v2 = Some(value);
            }
        }
    }

    #[test]
    fn validate_strips_noise_and_whitespace() {
        assert_eq!(validate(" 2 + 3 ").unwrap(), "2+3");
        assert_eq!(validate("1a+b2").unwrap(), "1+2");
    }

    #[test]
    fn validate_rejects_empty_and_unbalanced() {
        assert_eq!(validate(""), Err(ExpressionError::Empty));
        assert_eq!(validate("abc"), Err(ExpressionError::Empty));
        assert_eq!(
            validate("(1+2"),
            Err(ExpressionError::UnbalancedParentheses)
        );
        assert_eq!(
            validate("1+2)"),
            Err(ExpressionError::UnbalancedParentheses)
        );
        assert_eq!(
            validate(")1+2("),
            Err(ExpressionError::UnbalancedParentheses)
        );
    }

    #[test]
    fn single_literal_is_not_enough() {
        assert_eq!(
            decompose("e", "42"),
            Err(ExpressionError::NotEnoughValues)
        );
    }

    #[test]
    fn leading_operator_is_unary() {
        assert_eq!(decompose("e", "-5+3"), Err(ExpressionError::UnaryOperation));
    }

    #[test]
    fn literal_zero_divisor_is_rejected() {
        assert_eq!(decompose("e", "1/0"), Err(ExpressionError::DivisionByZero));
        assert_eq!(
            decompose("e", "(3+4)/0"),
            Err(ExpressionError::DivisionByZero)
        );
        // A divisor that is itself a subexpression is pending at parse time
        // and can only be rejected by arithmetic, not decomposition.
        assert!(decompose("e", "8/(2-2)").is_ok());
        assert!(decompose("e", "8/(2*0)").is_ok());
    }

    #[test]
    fn adjacent_operands_are_rejected() {
        assert_eq!(
            decompose("e", "(1+2)3"),
            Err(ExpressionError::DanglingOperands)
        );
    }

    #[test]
    fn simple_addition_is_one_root_operation() {
        let ops = decomposed("2+3");
        assert_eq!(ops.len(), 1);
        let root = &ops[0];
        assert_eq!(root.operator, Operator::Add);
        assert_eq!(root.v1, Some(2.0));
        assert_eq!(root.v2, Some(3.0));
        assert_eq!(root.parent_id, "expr-1");
        assert_eq!(root.status, OperationStatus::Ready);
    }

    #[test]
    fn parenthesized_child_feeds_left_slot() {
        let ops = decomposed("(1+2)*4");
        assert_eq!(ops.len(), 2);
        let child = &ops[0];
        let root = &ops[1];
        assert_eq!(child.operator, Operator::Add);
        assert!(child.left);
        assert_eq!(child.parent_id, root.operation_id.to_string());
        assert_eq!(root.operator, Operator::Mul);
        assert_eq!(root.v1, None);
        assert_eq!(root.v2, Some(4.0));
        assert!(root.is_root());
    }

    #[test]
    fn precedence_makes_product_the_right_child() {
        let ops = decomposed("10-2*3");
        assert_eq!(ops.len(), 2);
        let product = &ops[0];
        let root = &ops[1];
        assert_eq!(product.operator, Operator::Mul);
        assert_eq!(product.v1, Some(2.0));
        assert_eq!(product.v2, Some(3.0));
        assert!(!product.left);
        assert_eq!(product.parent_id, root.operation_id.to_string());
        assert_eq!(root.operator, Operator::Sub);
        assert_eq!(root.v1, Some(10.0));
        assert_eq!(root.v2, None);
    }

    #[test]
    fn independent_subtrees_are_both_immediately_executable() {
        let ops = decomposed("((1+2)*(3+4))");
        assert_eq!(ops.len(), 3);
        let executable = ops
            .iter()
            .filter(|op| op.v1.is_some() && op.v2.is_some())
            .count();
        assert_eq!(executable, 2);
    }

    #[test]
    fn every_decomposition_is_a_rooted_tree() {
        for expr in ["2+3", "(1+2)*4", "10-2*3", "((1+2)*(3+4))", "1+2*3-4/2"] {
            let ops = decomposed(expr);

            let roots: Vec<_> = ops.iter().filter(|op| op.is_root()).collect();
            assert_eq!(roots.len(), 1, "{expr}: exactly one root");

            let ids: Vec<String> = ops.iter().map(|op| op.operation_id.to_string()).collect();
            let mut children_per_slot: HashMap<(String, bool), usize> = HashMap::new();
            for op in ops.iter().filter(|op| !op.is_root()) {
                assert!(
                    ids.contains(&op.parent_id),
                    "{expr}: parent of {} is a sibling",
                    op.operation_id
                );
                *children_per_slot
                    .entry((op.parent_id.clone(), op.left))
                    .or_default() += 1;
            }
            // Each parent slot receives at most one child, and a slot fed by
            // a child must be NULL until promotion.
            for ((parent_id, left), count) in children_per_slot {
                assert_eq!(count, 1, "{expr}: one child per operand slot");
                let parent = ops
                    .iter()
                    .find(|op| op.operation_id.to_string() == parent_id)
                    .unwrap();
                let slot = if left { parent.v1 } else { parent.v2 };
                assert_eq!(slot, None, "{expr}: pending slot stays NULL");
            }
        }
    }

    #[test]
    fn round_trip_matches_reference_evaluation() {
        let cases = [
            ("2+3", 5.0),
            ("(1+2)*4", 12.0),
            ("10-2*3", 4.0),
            ("((1+2)*(3+4))", 21.0),
            ("5/5", 1.0),
            ("((10-2)/(1+3))", 2.0),
            ("1+2*3-4/2", 5.0),
            ("100*2+12/4-7", 196.0),
        ];
        for (expr, expected) in cases {
            let mut ops = decomposed(expr);
            let result = run_to_completion(&mut ops);
            assert_eq!(result, expected, "{expr}");
            assert!(ops
                .iter()
                .all(|op| op.status == OperationStatus::Done && op.result.is_some()));
        }
    }

    #[test]
    fn runtime_zero_divisor_completes_with_ieee_value() {
        let mut ops = decomposed("8/(2-2)");
        let result = run_to_completion(&mut ops);
        assert_eq!(result, f64::INFINITY);
    }

    #[test]
    fn rerunning_decomposition_yields_equivalent_trees() {
        let first = decomposed("(1+2)*4");
        let second = decomposed("(1+2)*4");
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.operator, b.operator);
            assert_eq!((a.v1, a.v2), (b.v1, b.v2));
            assert_eq!(a.left, b.left);
            assert_eq!(a.is_root(), b.is_root());
        }
    }
}

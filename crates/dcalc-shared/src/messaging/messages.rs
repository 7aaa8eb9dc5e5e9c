//! # Wire Payloads
//!
//! JSON shapes exchanged over the broker and the heartbeat endpoint. Field
//! names are part of the wire contract; statuses travel as integers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Operation, OperationStatus, Operator};

/// One dispatched operation, as it travels through the `operations_lists`
/// FIFO from orchestrator to agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPayload {
    #[serde(rename = "ExpressionID")]
    pub expression_id: String,
    #[serde(rename = "Operator")]
    pub operator: Operator,
    #[serde(rename = "V1")]
    pub v1: Option<f64>,
    #[serde(rename = "V2")]
    pub v2: Option<f64>,
    #[serde(rename = "OperationID")]
    pub operation_id: Uuid,
    #[serde(rename = "ParentID")]
    pub parent_id: String,
    #[serde(rename = "Left")]
    pub left: bool,
    #[serde(rename = "Status")]
    pub status: OperationStatus,
    #[serde(rename = "Result")]
    pub result: Option<f64>,
}

impl From<&Operation> for OperationPayload {
    fn from(op: &Operation) -> Self {
        Self {
            expression_id: op.expression_id.clone(),
            operator: op.operator,
            v1: op.v1,
            v2: op.v2,
            operation_id: op.operation_id,
            parent_id: op.parent_id.clone(),
            left: op.left,
            status: op.status,
            result: op.result,
        }
    }
}

/// A computed result, published by agents on the `results` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    #[serde(rename = "OperationID")]
    pub operation_id: Uuid,
    #[serde(rename = "Res")]
    pub result: f64,
}

/// Agent liveness report POSTed to the orchestrator every second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub worker_name: String,
    pub in_flight_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_payload_uses_wire_field_names() {
        let payload = OperationPayload {
            expression_id: "expr-9".into(),
            operator: Operator::Mul,
            v1: Some(3.0),
            v2: None,
            operation_id: Uuid::nil(),
            parent_id: "expr-9".into(),
            left: false,
            status: OperationStatus::Ready,
            result: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["ExpressionID"], "expr-9");
        assert_eq!(json["Operator"], "*");
        assert_eq!(json["V1"], 3.0);
        assert_eq!(json["V2"], serde_json::Value::Null);
        assert_eq!(json["Status"], 0);
        assert_eq!(json["Left"], false);

        let back: OperationPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.operator, Operator::Mul);
        assert_eq!(back.status, OperationStatus::Ready);
    }

    #[test]
    fn result_payload_matches_contract() {
        let json = serde_json::to_value(ResultPayload {
            operation_id: Uuid::nil(),
            result: 2.5,
        })
        .unwrap();
        assert_eq!(json["Res"], 2.5);
        assert!(json.get("OperationID").is_some());
    }
}

//! Minimal JSON-RPC 2.0 envelope used to carry `league.v2` messages.
//!
//! Every inbound HTTP request is a JSON-RPC object with
//! `method = "league.handle"` and `params = { envelope, payload }` (spec §4.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::RawEnvelope;

pub const LEAGUE_HANDLE_METHOD: &str = "league.handle";

/// Standard JSON-RPC error codes (spec §6).
pub mod rpc_error_code {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcParams {
    pub envelope: RawEnvelope,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub id: Value,
    pub params: RpcParams,
}

impl RpcRequest {
    /// Structural validation of the JSON-RPC shape itself (spec §4.1 step 1),
    /// independent of envelope contents.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.jsonrpc != "2.0" {
            return Err("jsonrpc must be \"2.0\"".to_string());
        }
        if self.method != LEAGUE_HANDLE_METHOD {
            return Err(format!("unknown method: {}", self.method));
        }
        if self.id.is_null() {
            return Err("id is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Success {
        jsonrpc: String,
        id: Value,
        result: Value,
    },
    Error {
        jsonrpc: String,
        id: Value,
        error: RpcErrorObject,
    },
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        RpcResponse::Success {
            jsonrpc: "2.0".to_string(),
            id,
            result,
        }
    }

    /// A JSON-RPC transport-level error (malformed request). League-level
    /// errors are NOT represented this way — they are `success` responses
    /// whose `result` contains an `ERROR` envelope (spec §6).
    pub fn transport_error(id: Value, code: i64, message: impl Into<String>) -> Self {
        RpcResponse::Error {
            jsonrpc: "2.0".to_string(),
            id,
            error: RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_request() -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: LEAGUE_HANDLE_METHOD.to_string(),
            id: Value::from(1),
            params: RpcParams {
                envelope: RawEnvelope {
                    protocol: "league.v2".to_string(),
                    message_type: "QUERY_STANDINGS".to_string(),
                    sender: "player:p1".to_string(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    conversation_id: Uuid::new_v4().to_string(),
                    message_seq: 0,
                    auth_token: Some("tok".to_string()),
                    league_id: Some("league-1".to_string()),
                    round_id: None,
                    match_id: None,
                    game_type: None,
                },
                payload: serde_json::json!({}),
            },
        }
    }

    #[test]
    fn valid_shape_passes() {
        assert!(sample_request().validate_shape().is_ok());
    }

    #[test]
    fn wrong_jsonrpc_version_rejected() {
        let mut req = sample_request();
        req.jsonrpc = "1.0".to_string();
        assert!(req.validate_shape().is_err());
    }

    #[test]
    fn wrong_method_rejected() {
        let mut req = sample_request();
        req.method = "league.other".to_string();
        assert!(req.validate_shape().is_err());
    }

    #[test]
    fn request_serialize_deserialize_round_trips() {
        let req = sample_request();
        let json = serde_json::to_string(&req).unwrap();
        let back: RpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.jsonrpc, req.jsonrpc);
        assert_eq!(back.method, req.method);
    }
}

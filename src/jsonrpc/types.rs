//! JSON-RPC 2.0 envelopes and the error-code mapping.
//!
//! # Error Codes
//! ```text
//! -32700 parse error          malformed JSON body
//! -32600 invalid request      not a JSON-RPC 2.0 envelope
//! -32601 method not found
//! -32602 invalid params
//! -32603 internal error
//! -32000 server error         Application (message carries the business error)
//! -32001 unavailable          CircuitOpen, NoEndpoints
//! -32002 timeout              DeadlineExceeded
//! -32003 transport            Transport
//! -32005 limit exceeded       RateLimited
//! ```

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Path every JSON-RPC call is posted to.
pub const RPC_PATH: &str = "/rpc";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const SERVER_ERROR: i32 = -32000;
pub const UNAVAILABLE: i32 = -32001;
pub const TIMEOUT: i32 = -32002;
pub const TRANSPORT: i32 = -32003;
pub const LIMIT_EXCEEDED: i32 = -32005;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            method: method.into(),
            params,
            id,
        }
    }
}

/// A response carries either `result` or `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Client-side view of a remote error. Business errors go through
    /// `decode`; a throttled call stays a rejection; everything else is a
    /// transport failure of that instance.
    pub fn into_rpc_error(self, decode: &dyn Fn(&str) -> RpcError) -> RpcError {
        match self.code {
            SERVER_ERROR => decode(&self.message),
            LIMIT_EXCEEDED => RpcError::RateLimited,
            code => RpcError::transport(format!("remote error {code}: {}", self.message)),
        }
    }
}

impl From<&RpcError> for JsonRpcError {
    fn from(err: &RpcError) -> Self {
        let code = match err {
            RpcError::Application(_) => SERVER_ERROR,
            RpcError::RateLimited => LIMIT_EXCEEDED,
            RpcError::CircuitOpen | RpcError::NoEndpoints => UNAVAILABLE,
            RpcError::DeadlineExceeded => TIMEOUT,
            RpcError::Transport(_) => TRANSPORT,
        };
        Self::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::http::client::remote_error;

    #[derive(Debug, thiserror::Error)]
    #[error("integer overflow")]
    struct Overflow;

    #[test]
    fn test_error_codes() {
        assert_eq!(JsonRpcError::from(&RpcError::application(Overflow)).code, SERVER_ERROR);
        assert_eq!(JsonRpcError::from(&RpcError::RateLimited).code, LIMIT_EXCEEDED);
        assert_eq!(JsonRpcError::from(&RpcError::CircuitOpen).code, UNAVAILABLE);
        assert_eq!(JsonRpcError::from(&RpcError::NoEndpoints).code, UNAVAILABLE);
        assert_eq!(JsonRpcError::from(&RpcError::DeadlineExceeded).code, TIMEOUT);
        assert_eq!(JsonRpcError::from(&RpcError::transport("reset")).code, TRANSPORT);
    }

    #[test]
    fn test_remote_errors_seen_by_the_client() {
        let err = JsonRpcError::from(&RpcError::application(Overflow)).into_rpc_error(&remote_error);
        assert_eq!(err.to_string(), "integer overflow");
        assert!(!err.is_retryable());

        let err = JsonRpcError::new(LIMIT_EXCEEDED, "rate limit exceeded").into_rpc_error(&remote_error);
        assert!(matches!(err, RpcError::RateLimited));

        let err = JsonRpcError::new(UNAVAILABLE, "circuit breaker is open").into_rpc_error(&remote_error);
        match err {
            RpcError::Transport(msg) => assert!(msg.contains("-32001")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn test_envelopes_omit_absent_members() {
        let response = JsonRpcResponse::success(json!("abc"), json!({ "v": 3 }));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "jsonrpc": "2.0", "result": { "v": 3 }, "id": "abc" })
        );

        let request: JsonRpcRequest = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"sum"}"#).unwrap();
        assert_eq!(request.params, None);
        assert_eq!(request.id, Value::Null);
    }
}

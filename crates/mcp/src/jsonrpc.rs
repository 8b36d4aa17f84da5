//! JSON-RPC 2.0 framing for the A2A endpoint. MCP rejections reuse the
//! error mapping in [`JsonRpcError::from_error`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::McpError;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent on notifications. An explicit `null` is still a request.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id: Some(id.into()), method: method.into(), params }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Decode a request body. Anything that is not a single well-formed
    /// JSON-RPC 2.0 request is an `InvalidRequest`.
    pub fn parse(body: Value) -> Result<Self, McpError> {
        let request: Self = serde_json::from_value(body)
            .map_err(|error| McpError::InvalidRequest(error.to_string()))?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(McpError::InvalidRequest(format!(
                "unsupported jsonrpc version `{}`",
                request.jsonrpc
            )));
        }
        Ok(request)
    }
}

/// `Some` whenever the field is present, `Some(Value::Null)` included.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn from_error(error: &McpError, correlation_id: &str) -> Self {
        let mut data = json!({
            "error_code": error.code_name(),
            "correlation_id": correlation_id,
        });
        if let Some(retry_after_secs) = error.retry_after_secs() {
            data["retry_after_secs"] = json!(retry_after_secs);
        }
        Self { code: error.error_code(), message: error.to_string(), data: Some(data) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, result: None, error: Some(error) }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{JsonRpcRequest, JsonRpcResponse};
    use crate::McpError;

    #[test]
    fn requests_without_id_are_notifications() {
        let request = JsonRpcRequest::parse(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .expect("parse");
        assert!(request.is_notification());
        assert!(request.params.is_null());
    }

    #[test]
    fn null_id_is_a_request_not_a_notification() {
        let request = JsonRpcRequest::parse(json!({
            "jsonrpc": "2.0",
            "id": null,
            "method": "message/send"
        }))
        .expect("parse");
        assert!(!request.is_notification());
        assert_eq!(request.id, Some(serde_json::Value::Null));

        let echoed = serde_json::to_value(&request).expect("encode");
        assert!(echoed.as_object().is_some_and(|object| object.contains_key("id")));
    }

    #[test]
    fn wrong_version_is_an_invalid_request() {
        let error = JsonRpcRequest::parse(json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" }))
            .expect_err("version rejected");
        assert!(matches!(error, McpError::InvalidRequest(_)));
        assert_eq!(error.error_code(), -32600);
    }

    #[test]
    fn responses_carry_either_result_or_error() {
        let ok = serde_json::to_value(JsonRpcResponse::success(json!(7), json!({}))).expect("encode");
        assert_eq!(ok["id"], 7);
        assert!(ok.get("error").is_none());

        let failed = JsonRpcResponse::failure(
            json!("a"),
            super::JsonRpcError::from_error(&McpError::MethodNotFound("x".to_string()), "corr-1"),
        );
        let encoded = serde_json::to_value(&failed).expect("encode");
        assert!(encoded.get("result").is_none());
        assert_eq!(encoded["error"]["code"], -32601);
        assert_eq!(encoded["error"]["data"]["correlation_id"], "corr-1");
    }
}

//! MCP Protocol Implementation
//!
//! JSON-RPC 2.0 envelope, MCP payload records and method names.

pub mod messages;
pub mod methods;
pub mod types;

pub use types::{
    ErrorCode, JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, LATEST_PROTOCOL_VERSION, RequestId,
    negotiate_protocol_version,
};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{McpError, McpResult};

/// Decode request params into a typed record.
///
/// Absent params decode as an empty object, so records whose fields are
/// all optional accept a bare request.
pub fn unmarshal<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let value = params.unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(value).map_err(|e| McpError::InvalidParams(e.to_string()))
}

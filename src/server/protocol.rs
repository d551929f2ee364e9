//! JSON-RPC 2.0 message types for the line-oriented query server.
//!
//! One JSON object per line in each direction. Requests without an `id` are
//! notifications and receive no response.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::engine::{EngineState, RankedAnswer, RetrievalError};

/// JSON-RPC 2.0 version identifier
pub const JSONRPC_VERSION: &str = "2.0";

/// Unique identifier for JSON-RPC messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

/// JSON-RPC 2.0 Request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<RequestId>,
}

/// JSON-RPC 2.0 Response message (success)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Value,
    pub id: RequestId,
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    pub error: JsonRpcError,
    pub id: Option<RequestId>,
}

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Server-defined error codes for retrieval failures
pub mod retrieval_error_codes {
    pub const INDEX_NOT_LOADED: i32 = -32001;
    pub const DIMENSION_MISMATCH: i32 = -32002;
    pub const EMBEDDING_FAILURE: i32 = -32003;
}

/// Parameters of the `answer` method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerParams {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

/// Result of the `answer` method
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub results: Vec<RankedAnswer>,
}

/// Result of the `reload` method
#[derive(Debug, Clone, Serialize)]
pub struct ReloadResult {
    pub state: EngineState,
    pub records: usize,
    pub dimension: usize,
}

impl JsonRpcResponse {
    #[inline]
    pub fn new(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            id,
        }
    }
}

impl JsonRpcErrorResponse {
    #[inline]
    pub fn new(error: JsonRpcError, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            error,
            id,
        }
    }
}

impl JsonRpcError {
    #[inline]
    pub fn new(code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            code,
            message,
            data,
        }
    }

    #[inline]
    pub fn parse_error() -> Self {
        Self::new(error_codes::PARSE_ERROR, "Parse error".to_string(), None)
    }

    #[inline]
    pub fn invalid_request() -> Self {
        Self::new(
            error_codes::INVALID_REQUEST,
            "Invalid Request".to_string(),
            None,
        )
    }

    #[inline]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
            None,
        )
    }

    #[inline]
    pub fn invalid_params(message: Option<String>) -> Self {
        let msg = message.unwrap_or_else(|| "Invalid params".to_string());
        Self::new(error_codes::INVALID_PARAMS, msg, None)
    }

    #[inline]
    pub fn internal_error(message: Option<String>) -> Self {
        let msg = message.unwrap_or_else(|| "Internal error".to_string());
        Self::new(error_codes::INTERNAL_ERROR, msg, None)
    }
}

impl From<&RetrievalError> for JsonRpcError {
    #[inline]
    fn from(error: &RetrievalError) -> Self {
        let code = match error {
            RetrievalError::EmptyQuery | RetrievalError::InvalidTopK => error_codes::INVALID_PARAMS,
            RetrievalError::IndexNotLoaded => retrieval_error_codes::INDEX_NOT_LOADED,
            RetrievalError::DimensionMismatch { .. } => retrieval_error_codes::DIMENSION_MISMATCH,
            RetrievalError::EmbeddingFailure(_) => retrieval_error_codes::EMBEDDING_FAILURE,
            RetrievalError::EmptyCorpus | RetrievalError::Artifact(_) => {
                error_codes::INTERNAL_ERROR
            }
        };
        Self::new(
            code,
            error.to_string(),
            Some(json!({ "retryable": error.is_retryable() })),
        )
    }
}

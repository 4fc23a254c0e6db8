//! JSON-RPC 2.0 消息定义与分发
//!
//! 每行一个请求，每行一个响应。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, info_span};

/// 协议版本
pub const JSONRPC_VERSION: &str = "2.0";

/// 请求不是合法 JSON
pub const PARSE_ERROR: i64 = -32700;
/// 请求结构不合法
pub const INVALID_REQUEST: i64 = -32600;
/// 方法不存在
pub const METHOD_NOT_FOUND: i64 = -32601;
/// 参数不合法
pub const INVALID_PARAMS: i64 = -32602;
/// 内部错误
pub const INTERNAL_ERROR: i64 = -32603;

/// 请求
#[derive(Debug, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// 错误对象
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// 响应
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl Response {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// `trace` 方法参数
#[derive(Debug, Deserialize)]
pub struct TraceParams {
    pub bar: String,
    pub baz: String,
}

/// `trace` 方法结果
#[derive(Debug, Serialize)]
pub struct TraceReply {
    pub msg: String,
}

/// 处理一行请求并生成响应
///
/// 缺少 `id` 的请求按 `null` 应答。
pub fn handle_line(line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("请求解析失败: {e}");
            return Response::failure(Value::Null, RpcError::new(PARSE_ERROR, "Parse error"));
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Response::failure(
            request.id,
            RpcError::new(INVALID_REQUEST, "Invalid Request"),
        );
    }

    match dispatch(&request.method, request.params) {
        Ok(result) => Response::success(request.id, result),
        Err(error) => Response::failure(request.id, error),
    }
}

fn dispatch(method: &str, params: Value) -> Result<Value, RpcError> {
    match method {
        "trace" => {
            let params: TraceParams = serde_json::from_value(params)
                .map_err(|e| RpcError::new(INVALID_PARAMS, format!("Invalid params: {e}")))?;
            to_value(trace(params))
        }
        "health" => Ok(serde_json::json!({ "status": "serving" })),
        _ => Err(RpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )),
    }
}

fn trace(params: TraceParams) -> TraceReply {
    let _span = info_span!("trace", bar = %params.bar, baz = %params.baz).entered();
    info!("Trace called");
    TraceReply {
        msg: params.bar + &params.baz,
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

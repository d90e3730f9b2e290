//! 网关错误类型
//!
//! 定义请求处理路径上对客户端可见的错误。非流式路径统一输出
//! `{"error": {"message", "type", "code", "chargpt_fallback"?}}`，
//! 流式路径输出同结构的单个 SSE 事件后结束流。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// 网关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// 请求体无法解析
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 后端流结束但没有可用的 message id 或内容
    #[error("Invalid response from ChatGPT backend")]
    ResponseInvalid {
        /// 累积阶段给出的失败描述（仅用于日志）
        detail: String,
    },

    /// 对话补全路由上无法降级的后端错误
    #[error("Failed to process ChatGPT response")]
    CompletionFailed {
        /// 底层错误码，未知时为 `unknown_error`
        code: String,
    },

    /// 模型列表、用户信息等路由上的后端或内部错误
    #[error("{message}")]
    Proxy { message: String, code: String },

    /// 流式转发中途出错
    #[error("Stream processing error")]
    StreamProcessing,

    /// 未匹配的路由
    #[error("Route {method} {path} not found")]
    NotFound { method: String, path: String },
}

impl GatewayError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::ResponseInvalid { .. } => 502,
            GatewayError::CompletionFailed { .. } => 502,
            GatewayError::Proxy { .. } => 500,
            GatewayError::StreamProcessing => 502,
            GatewayError::NotFound { .. } => 404,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::ResponseInvalid { .. } => "chargpt_response_invalid",
            GatewayError::CompletionFailed { .. } => "chargpt_proxy_error",
            GatewayError::Proxy { .. } => "chargpt_proxy_error",
            GatewayError::StreamProcessing => "chargpt_stream_error",
            GatewayError::NotFound { .. } => "not_found",
        }
    }

    /// 机器可读的错误码
    pub fn code(&self) -> Option<&str> {
        match self {
            GatewayError::InvalidRequest(_) => Some("invalid_request"),
            GatewayError::ResponseInvalid { .. } => Some("conversion_failed"),
            GatewayError::CompletionFailed { code } => Some(code),
            GatewayError::Proxy { code, .. } => Some(code),
            GatewayError::StreamProcessing => None,
            GatewayError::NotFound { .. } => Some("route_not_found"),
        }
    }

    /// 是否携带 `chargpt_fallback` 标记
    ///
    /// 该标记告诉调用方：网关已经尝试过降级但后端结果不可用。
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            GatewayError::ResponseInvalid { .. } | GatewayError::CompletionFailed { .. }
        )
    }

    /// 转换为 JSON 错误响应
    pub fn to_json(&self) -> serde_json::Value {
        let mut error = serde_json::Map::new();
        error.insert("message".into(), self.to_string().into());
        error.insert("type".into(), self.error_type().into());
        if let Some(code) = self.code() {
            error.insert("code".into(), code.into());
        }
        if self.is_fallback() {
            error.insert("chargpt_fallback".into(), true.into());
        }
        serde_json::json!({ "error": error })
    }

    /// 转换为单个 SSE 错误事件
    pub fn to_sse_event(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }

    /// 记录带上下文的错误日志
    pub fn log_with_context(&self, route: &str) {
        let detail = match self {
            GatewayError::ResponseInvalid { detail } => detail.as_str(),
            _ => "",
        };
        tracing::error!(
            route = %route,
            error_type = %self.error_type(),
            error_message = %self,
            detail = %detail,
            "[TRANSLIT] request failed"
        );
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

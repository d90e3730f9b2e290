//! 服务器工具函数
//!
//! 包含字符串处理、请求头解析、响应构建等公共工具函数。

use crate::error::GatewayError;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use futures::{Stream, StreamExt};

/// 逻辑线程 id 请求头
pub const THREAD_ID_HEADER: &str = "x-thread-id";

/// 服务名
pub const SERVICE_NAME: &str = "chargpt-gateway";

/// 安全截断字符串到指定字符数，避免 UTF-8 边界问题
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// 提取 `Authorization: Bearer <token>` 中的令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// 提取逻辑线程 id，缺省为 `default`
pub fn thread_id(headers: &HeaderMap) -> String {
    headers
        .get(THREAD_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(crate::session::DEFAULT_THREAD)
        .to_string()
}

/// 构建 SSE 响应
pub fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = String> + Send + 'static,
{
    let body_stream = events.map(|event| -> Result<Bytes, std::io::Error> { Ok(Bytes::from(event)) });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": {"message": "Failed to build streaming response"}})),
            )
                .into_response()
        })
}

/// 健康检查端点响应
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 未匹配路由
pub async fn not_found(method: Method, uri: Uri) -> Response {
    tracing::debug!("[PROXY] 未匹配的路由: {} {}", method, uri.path());
    GatewayError::NotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
    .into_response()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_safe_truncate_is_char_prefix(s in "\\PC{0,60}", n in 0usize..80) {
            let out = safe_truncate(&s, n);
            prop_assert!(s.starts_with(&out));
            prop_assert_eq!(out.chars().count(), s.chars().count().min(n));
        }
    }
}

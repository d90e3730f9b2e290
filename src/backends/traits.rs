//! 后端调用层 Trait 定义
//!
//! 后端层只负责 HTTP 请求/响应，不包含任何协议转换逻辑。
//! 传输层错误在这里被归一化为 `BackendError`，由降级策略决定是否替换为模拟响应。

use crate::models::chatgpt::ConversationRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::error::Error as StdError;
use std::pin::Pin;

/// 字节流类型
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// 后端调用结果
pub type BackendResult<T> = Result<T, BackendError>;

/// 后端错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// 错误类型
    pub kind: BackendErrorKind,
    /// 错误消息
    pub message: String,
    /// HTTP 状态码（如果有）
    pub status_code: Option<u16>,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// 后端错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// 域名解析失败
    Dns,
    /// 连接被拒绝
    ConnectionRefused,
    /// 连接或读取超时
    Timeout,
    /// 其他网络错误（连接重置、读取中断等）
    Network,
    /// 后端返回非 2xx 状态码
    Status,
    /// 响应体无法解析
    Decode,
    /// 请求构建等其他错误
    Other,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dns => write!(f, "Dns"),
            Self::ConnectionRefused => write!(f, "ConnectionRefused"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Network => write!(f, "Network"),
            Self::Status => write!(f, "Status"),
            Self::Decode => write!(f, "Decode"),
            Self::Other => write!(f, "Other"),
        }
    }
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Decode, message)
    }

    /// 非 2xx 响应
    pub fn from_status(status: u16, reason: &str) -> Self {
        Self {
            kind: BackendErrorKind::Status,
            message: format!("ChatGPT backend responded with {}: {}", status, reason),
            status_code: Some(status),
        }
    }

    /// 从 reqwest 错误转换
    ///
    /// 通过 `is_timeout` / `is_connect` 以及错误来源链中的文本判断类型，
    /// 消息中保留完整的来源链，供降级分类器匹配关键字。
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = error_chain(err);
        let lower = message.to_lowercase();

        let kind = if err.is_timeout() || lower.contains("timed out") {
            BackendErrorKind::Timeout
        } else if lower.contains("dns error")
            || lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
        {
            BackendErrorKind::Dns
        } else if lower.contains("connection refused") {
            BackendErrorKind::ConnectionRefused
        } else if err.is_connect() || err.is_request() || err.is_body() {
            BackendErrorKind::Network
        } else if err.is_decode() {
            BackendErrorKind::Decode
        } else {
            BackendErrorKind::Other
        };

        Self {
            kind,
            message,
            status_code: err.status().map(|s| s.as_u16()),
        }
    }

    /// 类 errno 的错误码，用于错误响应中的 `code` 字段
    pub fn code(&self) -> Option<&'static str> {
        match self.kind {
            BackendErrorKind::Dns => Some("ENOTFOUND"),
            BackendErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
            BackendErrorKind::Timeout => Some("ETIMEDOUT"),
            _ => None,
        }
    }

    /// 是否为传输层失败（没有拿到任何 HTTP 响应）
    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Dns
                | BackendErrorKind::ConnectionRefused
                | BackendErrorKind::Timeout
                | BackendErrorKind::Network
        )
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest(&err)
    }
}

/// 拼接错误及其全部来源
fn error_chain(err: &dyn StdError) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = inner.source();
    }
    parts.join(": ")
}

/// ChatGPT 后端 Trait
///
/// `caller_token` 是入站请求携带的 Bearer 凭证，仅在网关未配置访问令牌时使用。
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 发起对话，返回后端 SSE 字节流
    async fn conversation(
        &self,
        request: &ConversationRequest,
        caller_token: Option<&str>,
    ) -> BackendResult<ByteStream>;

    /// 模型列表原始 JSON
    async fn models(&self, caller_token: Option<&str>) -> BackendResult<serde_json::Value>;

    /// 当前用户信息原始 JSON
    async fn me(&self, caller_token: Option<&str>) -> BackendResult<serde_json::Value>;

    /// 用户设置原始 JSON
    async fn user_settings(&self, caller_token: Option<&str>)
        -> BackendResult<serde_json::Value>;

    /// 获取后端名称
    fn name(&self) -> &str;
}

//! 协议转换器 Trait 定义
//!
//! - `RequestTranslator`: 将前端协议请求转换为后端协议请求
//! - `ResponseTranslator`: 将重组后的 `RelayEvent` 转换为前端格式

use crate::stream::RelayEvent;

/// 请求转换器 Trait
pub trait RequestTranslator {
    /// 前端请求类型
    type Input;
    /// 后端请求类型
    type Output;
    /// 转换错误类型
    type Error: std::error::Error + Send + Sync + 'static;

    /// 转换请求
    fn translate_request(&self, request: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 响应转换器 Trait
pub trait ResponseTranslator {
    /// 目标响应类型
    type Output;

    /// 转换单个流事件
    ///
    /// 返回 `None` 表示该事件不需要输出。
    fn translate_event(&mut self, event: &RelayEvent) -> Option<Self::Output>;
}

/// 转换错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateError {
    pub kind: TranslateErrorKind,
    pub message: String,
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TranslateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateErrorKind {
    /// 缺少必要字段
    MissingField,
    /// 后端结果无法表示为前端响应
    InvalidResponse,
}

impl std::fmt::Display for TranslateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField => write!(f, "MissingField"),
            Self::InvalidResponse => write!(f, "InvalidResponse"),
        }
    }
}

impl TranslateError {
    pub fn new(kind: TranslateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            TranslateErrorKind::MissingField,
            format!("Missing required field: {}", field),
        )
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(TranslateErrorKind::InvalidResponse, message)
    }
}

impl From<TranslateError> for crate::error::GatewayError {
    fn from(err: TranslateError) -> Self {
        match err.kind {
            TranslateErrorKind::MissingField => Self::InvalidRequest(err.message),
            TranslateErrorKind::InvalidResponse => Self::ResponseInvalid {
                detail: err.message,
            },
        }
    }
}

//! 后端不可用时的降级判定
//!
//! 把后端错误分为两类：
//!
//! - `Unavailable`: 域名解析失败、连接被拒绝、超时，或消息中带有通用失败关键词。
//!   这类错误由模拟响应替代，不以错误形式返回给调用方。
//! - `HardError`: 其余错误，原样转换为错误响应，绝不替换为模拟内容。
//!
//! 判定先看结构化的错误类型，再对消息做关键词匹配，
//! 因为传输库给出的错误形态并不一致。

use crate::backends::{BackendError, BackendErrorKind};

/// 域名解析失败关键词
pub const DNS_FAILURE_KEYWORDS: &[&str] = &["eai_again", "enotfound", "getaddrinfo", "dns error"];

/// 连接被拒绝关键词
pub const CONNECTION_REFUSED_KEYWORDS: &[&str] = &["econnrefused", "connection refused"];

/// 超时关键词
pub const TIMEOUT_KEYWORDS: &[&str] = &["etimedout", "timed out", "timeout"];

/// 通用失败关键词
pub const GENERIC_FAILURE_KEYWORDS: &[&str] = &["failed"];

/// 不可用的具体原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableCause {
    Dns,
    ConnectionRefused,
    Timeout,
    GenericFailure,
}

impl UnavailableCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::ConnectionRefused => "connection_refused",
            Self::Timeout => "timeout",
            Self::GenericFailure => "failed",
        }
    }
}

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 后端环境不可用，使用模拟响应
    Unavailable(UnavailableCause),
    /// 需要返回给调用方的错误
    HardError,
}

impl FailureClass {
    /// 对后端错误分类
    pub fn classify(err: &BackendError) -> Self {
        match err.kind {
            BackendErrorKind::Dns => return Self::Unavailable(UnavailableCause::Dns),
            BackendErrorKind::ConnectionRefused => {
                return Self::Unavailable(UnavailableCause::ConnectionRefused)
            }
            BackendErrorKind::Timeout => return Self::Unavailable(UnavailableCause::Timeout),
            // 其他传输层错误一律视为不可用，关键词只用来细分原因
            BackendErrorKind::Network => {
                return match Self::classify_message(&err.message) {
                    Self::HardError => Self::Unavailable(UnavailableCause::GenericFailure),
                    class => class,
                }
            }
            _ => {}
        }
        Self::classify_message(&err.message)
    }

    /// 仅按消息关键词分类
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if matches(DNS_FAILURE_KEYWORDS) {
            Self::Unavailable(UnavailableCause::Dns)
        } else if matches(CONNECTION_REFUSED_KEYWORDS) {
            Self::Unavailable(UnavailableCause::ConnectionRefused)
        } else if matches(TIMEOUT_KEYWORDS) {
            Self::Unavailable(UnavailableCause::Timeout)
        } else if matches(GENERIC_FAILURE_KEYWORDS) {
            Self::Unavailable(UnavailableCause::GenericFailure)
        } else {
            Self::HardError
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// 是否应以模拟响应替代
pub fn should_use_mock(err: &BackendError) -> bool {
    let class = FailureClass::classify(err);
    if let FailureClass::Unavailable(cause) = class {
        tracing::warn!(
            "[MOCK] 后端不可用 ({})，使用模拟响应: {}",
            cause.as_str(),
            crate::logger::sanitize_log_message(&err.message)
        );
    }
    class.is_unavailable()
}

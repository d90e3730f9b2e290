//! 出站 HTTP 客户端工厂
//!
//! 根据网关配置创建访问后端的 reqwest 客户端，
//! 支持 socks5、http、https 三种出站代理。

use crate::config::GatewayConfig;
use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// 默认连接超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 代理协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Socks5,
    Http,
    Https,
}

impl ProxyProtocol {
    /// 从 URL 前缀识别协议，大小写不敏感
    pub fn from_url(url: &str) -> Option<Self> {
        let url_lower = url.to_lowercase();
        if url_lower.starts_with("socks5://") || url_lower.starts_with("socks5h://") {
            Some(ProxyProtocol::Socks5)
        } else if url_lower.starts_with("http://") {
            Some(ProxyProtocol::Http)
        } else if url_lower.starts_with("https://") {
            Some(ProxyProtocol::Https)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Socks5 => "socks5",
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
        }
    }
}

/// 客户端创建错误
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("无效的代理 URL: {0}")]
    InvalidUrl(String),

    #[error("不支持的代理协议: {0}")]
    UnsupportedProtocol(String),

    #[error("代理配置错误: {0}")]
    ConfigError(String),

    #[error("客户端构建错误: {0}")]
    ClientBuildError(String),
}

/// 出站客户端工厂
#[derive(Debug, Clone)]
pub struct ProxyClientFactory {
    /// 出站代理 URL
    proxy: Option<String>,
    /// 连接超时
    connect_timeout: Duration,
    /// 整个请求的超时，流式响应的读取也计入其中
    request_timeout: Duration,
    user_agent: Option<String>,
}

impl Default for ProxyClientFactory {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS),
            user_agent: None,
        }
    }
}

impl ProxyClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从网关配置创建
    ///
    /// 连接超时不超过请求超时。
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            proxy: config.outbound_proxy.clone(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT.min(config.request_timeout),
            request_timeout: config.request_timeout,
            user_agent: Some(config.user_agent.clone()),
        }
    }

    pub fn with_proxy(mut self, proxy_url: Option<String>) -> Self {
        self.proxy = proxy_url;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// 校验代理 URL 并返回协议类型
    pub fn parse_proxy_url(url: &str) -> Result<ProxyProtocol, ProxyError> {
        if url.trim().is_empty() {
            return Err(ProxyError::InvalidUrl("代理 URL 不能为空".to_string()));
        }

        ProxyProtocol::from_url(url).ok_or_else(|| ProxyError::UnsupportedProtocol(url.to_string()))
    }

    /// 创建 HTTP 客户端
    pub fn create_client(&self) -> Result<Client, ProxyError> {
        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout);

        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua.as_str());
        }

        if let Some(url) = self.proxy.as_deref() {
            let protocol = Self::parse_proxy_url(url)?;
            let proxy = Proxy::all(url).map_err(|e| ProxyError::ConfigError(e.to_string()))?;
            tracing::info!("[PROXY] 使用 {} 出站代理", protocol.as_str());
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| ProxyError::ClientBuildError(e.to_string()))
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_proxy_protocol_from_url() {
        assert_eq!(
            ProxyProtocol::from_url("SOCKS5://127.0.0.1:1080"),
            Some(ProxyProtocol::Socks5)
        );
        assert_eq!(
            ProxyProtocol::from_url("socks5h://127.0.0.1:1080"),
            Some(ProxyProtocol::Socks5)
        );
        assert_eq!(
            ProxyProtocol::from_url("http://proxy.example.com:8080"),
            Some(ProxyProtocol::Http)
        );
        assert_eq!(
            ProxyProtocol::from_url("HTTPS://secure-proxy.example.com:443"),
            Some(ProxyProtocol::Https)
        );
        assert_eq!(ProxyProtocol::from_url("ftp://invalid.com"), None);
    }

    #[test]
    fn test_parse_proxy_url_invalid() {
        assert!(matches!(
            ProxyClientFactory::parse_proxy_url("   "),
            Err(ProxyError::InvalidUrl(_))
        ));
        assert!(matches!(
            ProxyClientFactory::parse_proxy_url("invalid-url"),
            Err(ProxyError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_from_config_uses_config_values() {
        let config = GatewayConfig::from_lookup(|key| match key {
            "CHARGPT_PROXY" => Some("socks5://127.0.0.1:1080".to_string()),
            "CHARGPT_TIMEOUT_MS" => Some("2500".to_string()),
            _ => None,
        });
        let factory = ProxyClientFactory::from_config(&config);
        assert_eq!(factory.proxy(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(factory.request_timeout(), Duration::from_millis(2500));
        assert_eq!(factory.connect_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_create_client() {
        assert!(ProxyClientFactory::new().create_client().is_ok());
        assert!(ProxyClientFactory::new()
            .with_proxy(Some("http://proxy.example.com:8080".to_string()))
            .create_client()
            .is_ok());
        assert!(ProxyClientFactory::new()
            .with_proxy(Some("socks5://127.0.0.1:1080".to_string()))
            .create_client()
            .is_ok());
    }

    #[test]
    fn test_create_client_with_invalid_proxy() {
        let client = ProxyClientFactory::new()
            .with_proxy(Some("ftp://invalid.proxy:21".to_string()))
            .create_client();
        assert!(matches!(client, Err(ProxyError::UnsupportedProtocol(_))));
    }
}

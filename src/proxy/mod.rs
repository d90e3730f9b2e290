//! 出站代理
//!
//! 按配置创建访问后端的 HTTP 客户端

mod client_factory;

pub use client_factory::{ProxyClientFactory, ProxyError, ProxyProtocol, DEFAULT_CONNECT_TIMEOUT};

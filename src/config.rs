//! 网关配置
//!
//! 启动时从环境变量一次性读取，所有变量均可选。
//! 无法解析的值会记录警告并回退到默认值。
//!
//! # 环境变量
//!
//! - `CHARGPT_HOST` / `CHARGPT_PORT`: 监听地址，默认 `127.0.0.1:8842`
//! - `CHARGPT_BACKEND_API_URL`: ChatGPT 后端基地址
//! - `CHARGPT_ACCESS_TOKEN`: 访问后端使用的 Bearer 凭证
//! - `CHARGPT_USER_AGENT`: 发往后端的 User-Agent
//! - `CHARGPT_PROXY` (或 `HTTPS_PROXY`): 出站代理
//! - `CHARGPT_TIMEOUT_MS`: 后端请求超时，默认 30000
//! - `CHARGPT_SESSION_BACKEND`: 会话存储后端，默认 `sqlite`
//! - `CHARGPT_SESSION_TTL`: 无法解析过期时间的凭证使用的默认 TTL（秒）
//! - `CHARGPT_SESSION_DB`: sqlite 文件路径
//! - `CHARGPT_PG_DSN` / `CHARGPT_REDIS_URL` / `CHARGPT_MEMCACHED_SERVERS`
//! - `CHARGPT_DEBUG`: 打开调试日志

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8842;
pub const DEFAULT_BACKEND_API_URL: &str = "https://chatgpt.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (CharGPT)";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SESSION_BACKEND: &str = "sqlite";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
pub const DEFAULT_SESSION_DB: &str = "session.db";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_MEMCACHED_SERVERS: &str = "localhost:11211";

/// 会话存储配置
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// 首选的存储后端名称
    pub backend: String,
    /// 默认 TTL（秒）
    pub default_ttl_secs: u64,
    pub sqlite_path: PathBuf,
    pub postgres_dsn: Option<String>,
    pub redis_url: String,
    /// 逗号分隔的 memcached 地址
    pub memcached_servers: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_SESSION_BACKEND.to_string(),
            default_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sqlite_path: PathBuf::from(DEFAULT_SESSION_DB),
            postgres_dsn: None,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            memcached_servers: DEFAULT_MEMCACHED_SERVERS.to_string(),
        }
    }
}

/// 网关配置
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// ChatGPT 后端基地址，路径在其上拼接
    pub backend_base_url: String,
    pub access_token: Option<String>,
    pub user_agent: String,
    pub outbound_proxy: Option<String>,
    pub request_timeout: Duration,
    pub session: SessionConfig,
    pub debug: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backend_base_url: DEFAULT_BACKEND_API_URL.to_string(),
            access_token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            outbound_proxy: None,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            session: SessionConfig::default(),
            debug: false,
        }
    }
}

impl GatewayConfig {
    /// 从进程环境读取配置
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取配置
    ///
    /// 空字符串视为未设置。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let session = SessionConfig {
            backend: get("CHARGPT_SESSION_BACKEND")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(defaults.session.backend),
            default_ttl_secs: parse_or(
                "CHARGPT_SESSION_TTL",
                get("CHARGPT_SESSION_TTL"),
                DEFAULT_SESSION_TTL_SECS,
            ),
            sqlite_path: get("CHARGPT_SESSION_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.session.sqlite_path),
            postgres_dsn: get("CHARGPT_PG_DSN"),
            redis_url: get("CHARGPT_REDIS_URL").unwrap_or(defaults.session.redis_url),
            memcached_servers: get("CHARGPT_MEMCACHED_SERVERS")
                .unwrap_or(defaults.session.memcached_servers),
        };

        Self {
            host: get("CHARGPT_HOST").unwrap_or(defaults.host),
            port: parse_or("CHARGPT_PORT", get("CHARGPT_PORT"), DEFAULT_PORT),
            backend_base_url: get("CHARGPT_BACKEND_API_URL")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.backend_base_url),
            access_token: get("CHARGPT_ACCESS_TOKEN"),
            user_agent: get("CHARGPT_USER_AGENT").unwrap_or(defaults.user_agent),
            outbound_proxy: get("CHARGPT_PROXY").or_else(|| get("HTTPS_PROXY")),
            request_timeout: Duration::from_millis(parse_or(
                "CHARGPT_TIMEOUT_MS",
                get("CHARGPT_TIMEOUT_MS"),
                DEFAULT_TIMEOUT_MS,
            )),
            session,
            debug: get("CHARGPT_DEBUG").map(|v| parse_flag(&v)).unwrap_or(false),
        }
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 拼接后端 URL
    ///
    /// 与浏览器 `new URL(path, base)` 语义一致：绝对路径会替换基地址的路径部分。
    pub fn backend_url(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.backend_base_url)?.join(path)
    }

    /// 对话接口地址
    pub fn conversation_url(&self) -> Result<Url, url::ParseError> {
        self.backend_url("/backend-api/conversation")
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("[CONFIG] {} 的值 {:?} 无法解析，使用默认值", key, value);
            default
        }),
        None => default,
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

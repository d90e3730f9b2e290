//! 会话存储层
//!
//! 带 TTL 的键值存储，多个后端实现同一个 `ConversationStore` 契约：
//!
//! ```text
//! store/
//! ├── memory.rs      # 进程内 HashMap
//! ├── sqlite.rs      # 嵌入式文件数据库
//! ├── postgres.rs    # 关系型数据库
//! ├── redis.rs       # 分布式缓存 A
//! └── memcached.rs   # 分布式缓存 B
//! ```
//!
//! 所有后端共享逻辑表结构 `token TEXT PRIMARY KEY, data, expires`，
//! `expires` 为毫秒时间戳或空（永不过期）。读取时发现条目已过期，
//! 必须在同一次调用中删除并返回 `None`。

pub mod memcached;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod sqlite;

pub use memcached::MemcachedStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use redis::RedisStore;
pub use sqlite::SqliteStore;

use crate::config::SessionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 没有任何存储后端可用时进程的退出码
pub const STORE_UNAVAILABLE_EXIT_CODE: i32 = 101;

/// 内存后端清理过期条目的周期
pub const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// 固定的后端回退顺序
pub const STORE_PREFERENCE_ORDER: [StoreKind; 4] = [
    StoreKind::Sqlite,
    StoreKind::Postgres,
    StoreKind::Redis,
    StoreKind::Memcached,
];

/// 共享的存储实例
pub type SharedStore = Arc<dyn ConversationStore>;

/// 存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 后端初始化失败
    #[error("{backend} 初始化失败: {message}")]
    Init {
        backend: &'static str,
        message: String,
    },

    /// 后端读写失败
    #[error("{backend} 操作失败: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    /// 值序列化失败
    #[error("会话数据序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 未知的后端名称
    #[error("未知的会话存储后端: {0}")]
    UnknownKind(String),

    /// 所有候选后端均无法初始化
    #[error("没有可用的会话存储后端 (尝试过: {tried})")]
    NoBackendAvailable { tried: String },
}

impl StoreError {
    pub fn backend(backend: &'static str, err: impl fmt::Display) -> Self {
        StoreError::Backend {
            backend,
            message: err.to_string(),
        }
    }

    pub fn init(backend: &'static str, err: impl fmt::Display) -> Self {
        StoreError::Init {
            backend,
            message: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 会话存储契约
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 读取键值；过期条目被删除并返回 `None`
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;

    /// 写入键值，覆盖已有的值与 TTL；`ttl_secs = None` 表示永不过期
    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: Option<u64>,
    ) -> StoreResult<()>;

    /// 删除键
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// 后端名称
    fn name(&self) -> &'static str;
}

/// 存储条目
///
/// redis / memcached 以 JSON `{data, expires}` 整体保存；
/// sqlite / postgres 按列保存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub data: serde_json::Value,
    pub expires: Option<i64>,
}

impl StoredEntry {
    /// 以当前时间为基准创建条目
    pub fn new(data: serde_json::Value, ttl_secs: Option<u64>) -> Self {
        Self {
            data,
            expires: expires_at(ttl_secs),
        }
    }

    /// 条目是否已过期
    pub fn is_expired(&self) -> bool {
        is_expired(self.expires)
    }
}

/// 当前毫秒时间戳
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 计算过期毫秒时间戳
///
/// TTL 为 0 表示条目写入即过期。
pub fn expires_at(ttl_secs: Option<u64>) -> Option<i64> {
    ttl_secs.map(|ttl| {
        let ttl_ms = i64::try_from(ttl.saturating_mul(1000)).unwrap_or(i64::MAX);
        now_millis().saturating_add(ttl_ms)
    })
}

/// 过期判断：到达过期时刻即视为过期
pub fn is_expired(expires: Option<i64>) -> bool {
    matches!(expires, Some(at) if at <= now_millis())
}

/// 记录过期清理日志
pub(crate) fn log_expired(key: &str) {
    tracing::info!(
        "[SESSION] Expired session removed for token:{}",
        crate::logger::short_key(key)
    );
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Memory,
    Sqlite,
    Postgres,
    Redis,
    Memcached,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Sqlite => "sqlite",
            StoreKind::Postgres => "postgres",
            StoreKind::Redis => "redis",
            StoreKind::Memcached => "memcached",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "sqlite" => Ok(StoreKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(StoreKind::Postgres),
            "redis" => Ok(StoreKind::Redis),
            "memcached" | "memcache" => Ok(StoreKind::Memcached),
            other => Err(StoreError::UnknownKind(other.to_string())),
        }
    }
}

/// 计算候选后端顺序：配置的后端优先，然后是固定回退顺序，去重
pub fn candidate_order(configured: &str) -> Vec<StoreKind> {
    let mut order = Vec::with_capacity(STORE_PREFERENCE_ORDER.len() + 1);
    match configured.parse::<StoreKind>() {
        Ok(kind) => order.push(kind),
        Err(e) => tracing::warn!("[SESSION] {}，按默认顺序选择", e),
    }
    for kind in STORE_PREFERENCE_ORDER {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    order
}

/// 初始化指定类型的存储后端
pub async fn open_store(kind: StoreKind, config: &SessionConfig) -> StoreResult<SharedStore> {
    let store: SharedStore = match kind {
        StoreKind::Memory => {
            let store = Arc::new(MemoryStore::new());
            store.spawn_sweeper(MEMORY_SWEEP_INTERVAL);
            store
        }
        StoreKind::Sqlite => Arc::new(SqliteStore::open(&config.sqlite_path)?),
        StoreKind::Postgres => {
            let dsn = config
                .postgres_dsn
                .as_deref()
                .ok_or_else(|| StoreError::init("postgres", "CHARGPT_PG_DSN 未设置"))?;
            Arc::new(PostgresStore::connect(dsn).await?)
        }
        StoreKind::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
        StoreKind::Memcached => Arc::new(MemcachedStore::connect(&config.memcached_servers).await?),
    };
    Ok(store)
}

/// 选择会话存储后端
///
/// 依次尝试候选后端，返回第一个初始化成功的实例。
/// 全部失败时返回 `StoreError::NoBackendAvailable`，调用方应以
/// `STORE_UNAVAILABLE_EXIT_CODE` 退出进程。
pub async fn select_store(config: &SessionConfig) -> StoreResult<SharedStore> {
    let order = candidate_order(&config.backend);
    for kind in &order {
        match open_store(*kind, config).await {
            Ok(store) => {
                tracing::info!("[SESSION] 使用会话存储后端: {}", kind);
                return Ok(store);
            }
            Err(e) => {
                tracing::warn!(
                    "[SESSION] 会话存储后端 {} 不可用: {}",
                    kind,
                    crate::logger::sanitize_log_message(&e.to_string())
                );
            }
        }
    }

    let tried = order
        .iter()
        .map(StoreKind::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    Err(StoreError::NoBackendAvailable { tried })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("sqlite".parse::<StoreKind>().unwrap(), StoreKind::Sqlite);
        assert_eq!("Postgres".parse::<StoreKind>().unwrap(), StoreKind::Postgres);
        assert_eq!("memcache".parse::<StoreKind>().unwrap(), StoreKind::Memcached);
        assert!(matches!(
            "dynamo".parse::<StoreKind>(),
            Err(StoreError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_candidate_order_configured_first_and_deduplicated() {
        assert_eq!(
            candidate_order("redis"),
            vec![
                StoreKind::Redis,
                StoreKind::Sqlite,
                StoreKind::Postgres,
                StoreKind::Memcached
            ]
        );
        assert_eq!(candidate_order("sqlite"), STORE_PREFERENCE_ORDER.to_vec());
        assert_eq!(candidate_order("bogus"), STORE_PREFERENCE_ORDER.to_vec());
        assert_eq!(candidate_order("memory")[0], StoreKind::Memory);
        assert_eq!(candidate_order("memory").len(), 5);
    }

    #[test]
    fn test_expiry_helpers() {
        assert_eq!(expires_at(None), None);
        assert!(!is_expired(None));
        assert!(is_expired(expires_at(Some(0))));
        assert!(!is_expired(expires_at(Some(60))));
        assert!(is_expired(Some(now_millis() - 1)));
    }

    #[test]
    fn test_stored_entry_json_field_names() {
        let entry = StoredEntry {
            data: serde_json::json!({"conversationId": "c1"}),
            expires: Some(1_700_000_000_000),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["data"]["conversationId"], "c1");
        assert_eq!(json["expires"], 1_700_000_000_000i64);

        let unbounded: StoredEntry =
            serde_json::from_str(r#"{"data":{},"expires":null}"#).unwrap();
        assert_eq!(unbounded.expires, None);
        assert!(!unbounded.is_expired());
    }

    #[tokio::test]
    async fn test_select_store_prefers_configured_memory() {
        let config = SessionConfig {
            backend: "memory".to_string(),
            ..SessionConfig::default()
        };
        let store = select_store(&config).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn test_select_store_falls_back_to_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            backend: "postgres".to_string(),
            postgres_dsn: None,
            sqlite_path: dir.path().join("session.db"),
            ..SessionConfig::default()
        };
        let store = select_store(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
    }
}

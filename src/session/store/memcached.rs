//! memcached 会话存储
//!
//! 值为 JSON `{data, expires}`，同时设置原生过期时间。
//! memcache 客户端是阻塞的，所有调用放到 `spawn_blocking` 中执行。

use super::{log_expired, ConversationStore, StoreError, StoreResult, StoredEntry};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const BACKEND: &str = "memcached";

/// 超过 30 天的过期值会被 memcached 解释为 Unix 时间戳
const RELATIVE_EXPIRY_LIMIT_SECS: u64 = 60 * 60 * 24 * 30;

/// memcached 文本协议的键长上限
const MAX_KEY_LEN: usize = 250;

/// memcached 存储
#[derive(Clone)]
pub struct MemcachedStore {
    client: Arc<memcache::Client>,
}

impl MemcachedStore {
    /// 连接服务器列表并验证连通性
    ///
    /// `servers` 为逗号分隔的 `host:port` 列表。
    pub async fn connect(servers: &str) -> StoreResult<Self> {
        let urls = server_urls(servers);
        if urls.is_empty() {
            return Err(StoreError::init(BACKEND, "没有配置 memcached 服务器"));
        }

        let client = tokio::task::spawn_blocking(move || {
            let client = memcache::Client::connect(urls)?;
            client.version()?;
            Ok::<_, memcache::MemcacheError>(client)
        })
        .await
        .map_err(|e| StoreError::init(BACKEND, e))?
        .map_err(|e| StoreError::init(BACKEND, e))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> Result<T, memcache::MemcacheError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || op(&client))
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))?
            .map_err(|e| StoreError::backend(BACKEND, e))
    }
}

/// `host:port,host:port` 转为 `memcache://host:port` 列表
pub(crate) fn server_urls(servers: &str) -> Vec<String> {
    servers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with("memcache://") {
                s.to_string()
            } else {
                format!("memcache://{}", s)
            }
        })
        .collect()
}

/// memcached 可接受的键
///
/// 键中不能有空白或控制字符，长度不超过 250 字节；
/// 不满足时改用原键的 sha256 摘要。
pub(crate) fn native_key(key: &str) -> String {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.bytes().all(|b| b.is_ascii_graphic());
    if valid {
        return key.to_string();
    }
    let digest = Sha256::digest(key.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("h:{}", hex)
}

/// 原生过期值
///
/// 0 在 memcached 中表示永不过期，因此已过期条目保留 1 秒；
/// 超过 30 天的 TTL 转换为绝对时间戳。
pub(crate) fn native_expiration(ttl_secs: Option<u64>) -> u32 {
    match ttl_secs {
        None => 0,
        Some(ttl) if ttl <= RELATIVE_EXPIRY_LIMIT_SECS => ttl.max(1) as u32,
        Some(ttl) => {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            u32::try_from(now.saturating_add(ttl)).unwrap_or(u32::MAX)
        }
    }
}

#[async_trait]
impl ConversationStore for MemcachedStore {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let owned = native_key(key);
        let raw: Option<String> = self.run(move |c| c.get(&owned)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let entry: StoredEntry = serde_json::from_str(&raw)?;
        if entry.is_expired() {
            self.delete(key).await?;
            log_expired(key);
            return Ok(None);
        }
        Ok(Some(entry.data))
    }

    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: Option<u64>,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(&StoredEntry::new(value.clone(), ttl_secs))?;
        let expiration = native_expiration(ttl_secs);
        let owned = native_key(key);
        self.run(move |c| c.set(&owned, payload.as_str(), expiration))
            .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let owned = native_key(key);
        self.run(move |c| c.delete(&owned).map(|_| ())).await
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_urls() {
        assert_eq!(
            server_urls("localhost:11211, cache-2:11211,,memcache://cache-3:11211"),
            vec![
                "memcache://localhost:11211".to_string(),
                "memcache://cache-2:11211".to_string(),
                "memcache://cache-3:11211".to_string(),
            ]
        );
        assert!(server_urls(" , ").is_empty());
    }

    #[test]
    fn test_native_key_escapes_unusable_keys() {
        let plain = format!("{}:work", "a".repeat(64));
        assert_eq!(native_key(&plain), plain);

        let spaced = native_key("abc:my thread");
        assert!(spaced.starts_with("h:"));
        assert_eq!(spaced.len(), 2 + 64);
        assert_ne!(spaced, native_key("abc:my  thread"));

        let long = native_key(&format!("abc:{}", "x".repeat(300)));
        assert!(long.len() <= MAX_KEY_LEN);

        assert!(native_key("abc:线程").starts_with("h:"));
        assert!(native_key("abc:a\r\nb").bytes().all(|b| b.is_ascii_graphic()));
    }

    #[test]
    fn test_native_expiration() {
        assert_eq!(native_expiration(None), 0);
        assert_eq!(native_expiration(Some(0)), 1);
        assert_eq!(native_expiration(Some(86_400)), 86_400);

        let far = native_expiration(Some(RELATIVE_EXPIRY_LIMIT_SECS + 1));
        assert!(u64::from(far) > RELATIVE_EXPIRY_LIMIT_SECS);
    }

    #[tokio::test]
    async fn test_connect_without_servers_fails() {
        assert!(matches!(
            MemcachedStore::connect("").await,
            Err(StoreError::Init { backend: "memcached", .. })
        ));
    }
}

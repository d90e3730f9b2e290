//! Redis 会话存储
//!
//! 值为 JSON `{data, expires}`，同时设置原生 `EX` 过期。
//! 读取时仍做一次过期检查，防止时钟偏差导致返回过期数据。

use super::{log_expired, ConversationStore, StoreError, StoreResult, StoredEntry};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

const BACKEND: &str = "redis";
const POOL_MAX_SIZE: usize = 16;

/// Redis 存储
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// 建立连接池并用 PING 验证连通性
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let mut cfg = Config::from_url(url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(POOL_MAX_SIZE));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::init(BACKEND, e))?;

        let mut conn = pool.get().await.map_err(|e| StoreError::init(BACKEND, e))?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StoreError::init(BACKEND, e))?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))
    }
}

/// 原生过期秒数
///
/// `EX` 不接受 0，已过期的条目保留 1 秒，由读取时的检查清理。
pub(crate) fn native_expiry_secs(ttl_secs: Option<u64>) -> Option<u64> {
    ttl_secs.map(|ttl| ttl.max(1))
}

#[async_trait]
impl ConversationStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry: StoredEntry = serde_json::from_str(&raw)?;
        if entry.is_expired() {
            conn.del::<_, ()>(key)
                .await
                .map_err(|e| StoreError::backend(BACKEND, e))?;
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
        let mut conn = self.conn().await?;
        let result = match native_expiry_secs(ttl_secs) {
            Some(secs) => conn.set_ex::<_, _, ()>(key, payload, secs).await,
            None => conn.set::<_, _, ()>(key, payload).await,
        };
        result.map_err(|e| StoreError::backend(BACKEND, e))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

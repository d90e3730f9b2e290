//! Postgres 会话存储
//!
//! 表结构与 sqlite 相同，`data` 使用 JSONB，`expires` 使用 BIGINT。
//! 连接池由 deadpool-postgres 管理。

use super::{is_expired, log_expired, ConversationStore, StoreError, StoreResult, StoredEntry};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::str::FromStr;
use tokio_postgres::NoTls;

const BACKEND: &str = "postgres";
const POOL_MAX_SIZE: usize = 16;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    data JSONB,
    expires BIGINT
)";

const UPSERT_SQL: &str = "INSERT INTO sessions (token, data, expires)
    VALUES ($1, $2::text::jsonb, $3)
    ON CONFLICT (token) DO UPDATE SET data = EXCLUDED.data, expires = EXCLUDED.expires";

/// Postgres 存储
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// 连接数据库并创建表
    pub async fn connect(dsn: &str) -> StoreResult<Self> {
        let pg_config =
            tokio_postgres::Config::from_str(dsn).map_err(|e| StoreError::init(BACKEND, e))?;
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(POOL_MAX_SIZE)
            .build()
            .map_err(|e| StoreError::init(BACKEND, e))?;

        let client = pool.get().await.map_err(|e| StoreError::init(BACKEND, e))?;
        client
            .batch_execute(CREATE_TABLE_SQL)
            .await
            .map_err(|e| StoreError::init(BACKEND, e))?;

        Ok(Self { pool })
    }

    async fn client(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))
    }
}

/// 把查询结果行还原为存储条目
fn entry_from_columns(data: Option<String>, expires: Option<i64>) -> StoreResult<StoredEntry> {
    let data = match data {
        Some(text) => serde_json::from_str(&text)?,
        None => serde_json::Value::Null,
    };
    Ok(StoredEntry { data, expires })
}

#[async_trait]
impl ConversationStore for PostgresStore {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT data::text, expires FROM sessions WHERE token = $1",
                &[&key],
            )
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let entry = entry_from_columns(row.get(0), row.get(1))?;
        if is_expired(entry.expires) {
            client
                .execute("DELETE FROM sessions WHERE token = $1", &[&key])
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
        let entry = StoredEntry::new(value.clone(), ttl_secs);
        let json = serde_json::to_string(&entry.data)?;
        let client = self.client().await?;
        client
            .execute(UPSERT_SQL, &[&key, &json, &entry.expires])
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let client = self.client().await?;
        client
            .execute("DELETE FROM sessions WHERE token = $1", &[&key])
            .await
            .map_err(|e| StoreError::backend(BACKEND, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

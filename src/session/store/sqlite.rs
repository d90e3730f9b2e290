//! sqlite 会话存储
//!
//! 表结构：`sessions(token TEXT PRIMARY KEY, data TEXT, expires INTEGER)`，
//! `data` 为 JSON 文本，`expires` 为毫秒时间戳或 NULL。

use super::{is_expired, log_expired, ConversationStore, StoreError, StoreResult, StoredEntry};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type DbConnection = Arc<Mutex<Connection>>;

const BACKEND: &str = "sqlite";

/// 创建表结构
fn create_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            data TEXT,
            expires INTEGER
        )",
        [],
    )?;
    Ok(())
}

/// sqlite 存储
#[derive(Clone)]
pub struct SqliteStore {
    conn: DbConnection,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::init(BACKEND, e))?;
        Self::from_connection(conn)
    }

    /// 内存数据库，测试使用
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::init(BACKEND, e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        create_tables(&conn).map_err(|e| StoreError::init(BACKEND, e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::backend(BACKEND, e))
    }

    /// 读取原始行，不做过期检查
    pub fn get_raw(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT data, expires FROM sessions WHERE token = ?1",
                params![key],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::backend(BACKEND, e))?;

        match row {
            Some((data, expires)) => {
                let data = match data {
                    Some(text) => serde_json::from_str(&text)?,
                    None => serde_json::Value::Null,
                };
                Ok(Some(StoredEntry { data, expires }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let Some(entry) = self.get_raw(key)? else {
            return Ok(None);
        };
        if is_expired(entry.expires) {
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
        let entry = StoredEntry::new(value.clone(), ttl_secs);
        let json = serde_json::to_string(&entry.data)?;
        let conn = self.lock()?;
        conn.execute(
            "REPLACE INTO sessions (token, data, expires) VALUES (?1, ?2, ?3)",
            params![key, json, entry.expires],
        )
        .map_err(|e| StoreError::backend(BACKEND, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![key])
            .map_err(|e| StoreError::backend(BACKEND, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set("token", &json!({"conversationId": "abc"}), Some(60))
                .await
                .unwrap();
        }

        // 重新打开后数据仍在
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get("token").await.unwrap(),
            Some(json!({"conversationId": "abc"}))
        );
    }

    #[tokio::test]
    async fn test_expired_row_is_deleted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("token", &json!({"a": 1}), Some(0)).await.unwrap();
        assert!(store.get_raw("token").unwrap().is_some());

        assert_eq!(store.get("token").await.unwrap(), None);
        assert!(store.get_raw("token").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_null_expiry_is_stored_as_null() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("token", &json!({}), None).await.unwrap();
        let raw = store.get_raw("token").unwrap().unwrap();
        assert_eq!(raw.expires, None);
        assert_eq!(raw.data, json!({}));
    }

    #[tokio::test]
    async fn test_replace_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("token", &json!({"v": 1}), None).await.unwrap();
        store.set("token", &json!({"v": 2}), Some(60)).await.unwrap();
        let raw = store.get_raw("token").unwrap().unwrap();
        assert_eq!(raw.data, json!({"v": 2}));
        assert!(raw.expires.is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.delete("missing").await.unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}

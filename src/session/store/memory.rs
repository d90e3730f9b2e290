//! 进程内会话存储

use super::{log_expired, ConversationStore, StoreResult, StoredEntry};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 基于 HashMap 的存储，进程退出即丢失
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 条目数量（包含尚未被惰性清理的过期条目）
    pub fn raw_len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 是否物理存在该键，不做过期检查
    pub fn contains_raw(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// 清理所有过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// 启动后台清理任务
    ///
    /// 读取时的惰性删除已保证正确性，这里只回收从未再被读取的条目。
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    tracing::debug!("[SESSION] 清理了 {} 个过期会话", removed);
                }
            }
        })
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                log_expired(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: Option<u64>,
    ) -> StoreResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), StoredEntry::new(value.clone(), ttl_secs));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

//! 会话延续管理
//!
//! 按 `(凭证, 线程)` 记住后端的 conversation id 与最后一条 message id，
//! 让下一轮请求可以在同一个后端会话中继续。
//!
//! 存储键为 `sha256(凭证) + ":" + 线程`，原始凭证不会出现在键空间中。
//! TTL 在每次写入时从本次请求的凭证推导：三段式 JWT 取 `exp` 剩余秒数，
//! 其余凭证使用默认 TTL。凭证只做解码，不做签名校验。

use super::store::{SharedStore, StoreResult};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 单线程调用方使用的默认线程 id
pub const DEFAULT_THREAD: &str = "default";

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// 会话延续记录
///
/// 字段名在所有存储后端之间保持一致；缺失字段不序列化，
/// 因此只被 touch 过的记录是 `{}`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

impl ContinuationRecord {
    /// 从存储值解析，无法识别时视为空记录
    fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<f64>,
}

/// 会话管理器
#[derive(Clone)]
pub struct SessionManager {
    store: SharedStore,
    default_ttl: u64,
}

impl SessionManager {
    pub fn new(store: SharedStore, default_ttl: u64) -> Self {
        Self { store, default_ttl }
    }

    /// 底层存储
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// 凭证的 sha256 十六进制摘要
    pub fn hash_token(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// 存储键
    pub fn thread_key(token: &str, thread: &str) -> String {
        format!("{}:{}", Self::hash_token(token), thread)
    }

    /// 从凭证推导 TTL（秒）
    ///
    /// 中段可解码且含 `exp` 时返回剩余秒数（已过期为 0），
    /// 任何解析失败都回退到默认 TTL。
    pub fn extract_ttl(&self, token: &str) -> u64 {
        match jwt_expiry(token) {
            Some(exp) => {
                let now = chrono::Utc::now().timestamp();
                u64::try_from(exp.saturating_sub(now)).unwrap_or(0)
            }
            None => self.default_ttl,
        }
    }

    /// 读取完整的延续记录
    pub async fn get_continuation(
        &self,
        token: &str,
        thread: &str,
    ) -> StoreResult<Option<ContinuationRecord>> {
        let key = Self::thread_key(token, thread);
        let value = self.store.get(&key).await?;
        Ok(value.map(ContinuationRecord::from_value))
    }

    /// 读取 conversation id
    pub async fn get_conversation(&self, token: &str, thread: &str) -> StoreResult<Option<String>> {
        Ok(self
            .get_continuation(token, thread)
            .await?
            .and_then(|record| record.conversation_id))
    }

    /// 保存 conversation id，替换已有记录
    pub async fn store_conversation(
        &self,
        token: &str,
        thread: &str,
        conversation_id: &str,
    ) -> StoreResult<()> {
        let record = ContinuationRecord {
            conversation_id: Some(conversation_id.to_string()),
            parent_message_id: None,
        };
        self.write(token, thread, &record).await
    }

    /// 保存 conversation id 与最后一条 message id
    pub async fn store_continuation(
        &self,
        token: &str,
        thread: &str,
        conversation_id: Option<&str>,
        parent_message_id: Option<&str>,
    ) -> StoreResult<()> {
        let record = ContinuationRecord {
            conversation_id: conversation_id.map(str::to_string),
            parent_message_id: parent_message_id.map(str::to_string),
        };
        self.write(token, thread, &record).await
    }

    /// 以新 TTL 重写已有记录，不存在时写入空记录
    pub async fn touch_session(&self, token: &str, thread: &str) -> StoreResult<()> {
        let key = Self::thread_key(token, thread);
        let ttl = self.extract_ttl(token);
        let existing = self
            .store
            .get(&key)
            .await?
            .unwrap_or_else(|| serde_json::json!({}));
        self.store.set(&key, &existing, Some(ttl)).await
    }

    async fn write(&self, token: &str, thread: &str, record: &ContinuationRecord) -> StoreResult<()> {
        let key = Self::thread_key(token, thread);
        let ttl = self.extract_ttl(token);
        let value = serde_json::to_value(record)?;
        self.store.set(&key, &value, Some(ttl)).await
    }
}

/// 尝试解析三段式凭证中段的 `exp`
pub fn jwt_expiry(token: &str) -> Option<i64> {
    let mut segments = token.split('.');
    let (_, payload, _) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() || payload.is_empty() {
        return None;
    }

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .or_else(|_| STANDARD_LENIENT.decode(payload))
        .ok()?;
    let claims: ExpiryClaims = serde_json::from_slice(&bytes).ok()?;
    claims.exp.filter(|exp| exp.is_finite()).map(|exp| exp as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::{ConversationStore, MemoryStore};
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use std::sync::Arc;
    use std::time::Duration;

    fn fake_jwt(exp: i64) -> String {
        let claims = serde_json::json!({ "exp": exp, "sub": "user" }).to_string();
        format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(claims))
    }

    fn manager() -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionManager::new(store.clone(), 86_400);
        (store, manager)
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            SessionManager::hash_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let key = SessionManager::thread_key("secret", "t1");
        assert!(key.ends_with(":t1"));
        assert!(!key.contains("secret"));
        assert_eq!(key.len(), 64 + 3);
    }

    #[test]
    fn test_extract_ttl_from_jwt() {
        let (_, manager) = manager();
        let now = chrono::Utc::now().timestamp();

        let ttl = manager.extract_ttl(&fake_jwt(now + 120));
        assert!((118..=120).contains(&ttl));

        assert_eq!(manager.extract_ttl(&fake_jwt(now - 10)), 0);
    }

    #[test]
    fn test_extract_ttl_accepts_padded_standard_base64() {
        let (_, manager) = manager();
        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({ "exp": now + 60 }).to_string();
        let token = format!("h.{}.s", STANDARD.encode(claims));
        assert!(manager.extract_ttl(&token) <= 60);
        assert!(manager.extract_ttl(&token) >= 58);
    }

    #[test]
    fn test_extract_ttl_falls_back_to_default() {
        let (_, manager) = manager();
        assert_eq!(manager.extract_ttl("plain-token"), 86_400);
        assert_eq!(manager.extract_ttl("a.!!!.c"), 86_400);
        assert_eq!(manager.extract_ttl("a.b.c.d"), 86_400);

        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"x"}"#));
        assert_eq!(manager.extract_ttl(&no_exp), 86_400);
    }

    #[tokio::test]
    async fn test_store_then_get_before_and_after_expiry() {
        let (store, manager) = manager();
        let token = fake_jwt(chrono::Utc::now().timestamp() + 1);

        manager.store_conversation(&token, "t1", "cid1").await.unwrap();
        assert_eq!(
            manager.get_conversation(&token, "t1").await.unwrap().as_deref(),
            Some("cid1")
        );

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(manager.get_conversation(&token, "t1").await.unwrap(), None);
        assert!(!store.contains_raw(&SessionManager::thread_key(&token, "t1")));
    }

    #[tokio::test]
    async fn test_touch_does_not_fabricate_conversation() {
        let (store, manager) = manager();

        manager.touch_session("plain-token", "t1").await.unwrap();
        assert_eq!(
            manager.get_conversation("plain-token", "t1").await.unwrap(),
            None
        );
        let key = SessionManager::thread_key("plain-token", "t1");
        assert_eq!(store.get(&key).await.unwrap(), Some(serde_json::json!({})));

        manager
            .store_conversation("plain-token", "t1", "cid2")
            .await
            .unwrap();
        manager.touch_session("plain-token", "t1").await.unwrap();
        manager.touch_session("plain-token", "t1").await.unwrap();
        assert_eq!(
            manager
                .get_conversation("plain-token", "t1")
                .await
                .unwrap()
                .as_deref(),
            Some("cid2")
        );
    }

    #[tokio::test]
    async fn test_threads_are_independent() {
        let (_, manager) = manager();
        manager.store_conversation("tok", "a", "conv-a").await.unwrap();
        manager.store_conversation("tok", "b", "conv-b").await.unwrap();

        assert_eq!(
            manager.get_conversation("tok", "a").await.unwrap().as_deref(),
            Some("conv-a")
        );
        assert_eq!(
            manager.get_conversation("tok", "b").await.unwrap().as_deref(),
            Some("conv-b")
        );
        assert_eq!(manager.get_conversation("other", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_continuation_keeps_parent_message_id() {
        let (store, manager) = manager();
        manager
            .store_continuation("tok", DEFAULT_THREAD, Some("conv"), Some("msg-9"))
            .await
            .unwrap();

        let record = manager
            .get_continuation("tok", DEFAULT_THREAD)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.conversation_id.as_deref(), Some("conv"));
        assert_eq!(record.parent_message_id.as_deref(), Some("msg-9"));

        let raw = store
            .get(&SessionManager::thread_key("tok", DEFAULT_THREAD))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"conversationId": "conv", "parentMessageId": "msg-9"})
        );
    }

    #[tokio::test]
    async fn test_store_conversation_replaces_record() {
        let (_, manager) = manager();
        manager
            .store_continuation("tok", "t", Some("old"), Some("m1"))
            .await
            .unwrap();
        manager.store_conversation("tok", "t", "new").await.unwrap();

        let record = manager.get_continuation("tok", "t").await.unwrap().unwrap();
        assert_eq!(record.conversation_id.as_deref(), Some("new"));
        assert_eq!(record.parent_message_id, None);
    }
}

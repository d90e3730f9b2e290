//! ChatGPT 后端
//!
//! 通过 `ProxyClientFactory` 创建的 reqwest 客户端访问 `/backend-api/*`。

use super::traits::{BackendError, BackendErrorKind, BackendResult, ByteStream, ChatBackend};
use crate::config::GatewayConfig;
use crate::logger::sanitize_log_message;
use crate::models::chatgpt::ConversationRequest;
use crate::proxy::{ProxyClientFactory, ProxyError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

const CONVERSATION_PATH: &str = "/backend-api/conversation";
const MODELS_PATH: &str = "/backend-api/models";
const ME_PATH: &str = "/backend-api/me";
const USER_SETTINGS_PATH: &str = "/backend-api/settings/user";

/// ChatGPT 后端客户端
#[derive(Debug, Clone)]
pub struct ChatGptBackend {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl ChatGptBackend {
    /// 从网关配置创建
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ProxyError> {
        let base_url = Url::parse(&config.backend_base_url)
            .map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", config.backend_base_url, e)))?;
        let client = ProxyClientFactory::from_config(config).create_client()?;

        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> BackendResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::new(BackendErrorKind::Other, e.to_string()))
    }

    /// 网关配置的令牌优先，其次是调用方的 Bearer
    fn bearer<'a>(&'a self, caller_token: Option<&'a str>) -> Option<&'a str> {
        self.access_token.as_deref().or(caller_token)
    }

    fn authorize(&self, builder: RequestBuilder, caller_token: Option<&str>) -> RequestBuilder {
        match self.bearer(caller_token) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let resp = builder.send().await.map_err(|e| {
            let err = BackendError::from_reqwest(&e);
            tracing::warn!(
                "[PROXY] 请求后端失败 ({}): {}",
                err.kind,
                sanitize_log_message(&err.message)
            );
            err
        })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown");
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                "[PROXY] 后端返回错误: {} - {}",
                status,
                crate::server_utils::safe_truncate(&sanitize_log_message(&body), 500)
            );
            return Err(BackendError::from_status(status.as_u16(), reason));
        }
        Ok(resp)
    }

    async fn get_json(&self, path: &str, caller_token: Option<&str>) -> BackendResult<serde_json::Value> {
        let url = self.url(path)?;
        tracing::debug!("[PROXY] GET {}", url);
        let builder = self
            .client
            .get(url)
            .header("Accept", "application/json");
        let resp = self.send(self.authorize(builder, caller_token)).await?;
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| BackendError::decode(format!("invalid JSON from {}: {}", path, e)))
    }
}

#[async_trait]
impl ChatBackend for ChatGptBackend {
    async fn conversation(
        &self,
        request: &ConversationRequest,
        caller_token: Option<&str>,
    ) -> BackendResult<ByteStream> {
        let url = self.url(CONVERSATION_PATH)?;
        tracing::info!(
            "[PROXY] 发起对话请求: url={} model={} continuing={}",
            url,
            request.model,
            request.conversation_id.is_some()
        );

        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request);
        let resp = self.send(self.authorize(builder, caller_token)).await?;

        tracing::info!("[PROXY] 后端流开始: status={}", resp.status());
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BackendError::from_reqwest(&e)));
        Ok(Box::pin(stream))
    }

    async fn models(&self, caller_token: Option<&str>) -> BackendResult<serde_json::Value> {
        self.get_json(MODELS_PATH, caller_token).await
    }

    async fn me(&self, caller_token: Option<&str>) -> BackendResult<serde_json::Value> {
        self.get_json(ME_PATH, caller_token).await
    }

    async fn user_settings(
        &self,
        caller_token: Option<&str>,
    ) -> BackendResult<serde_json::Value> {
        self.get_json(USER_SETTINGS_PATH, caller_token).await
    }

    fn name(&self) -> &str {
        "chatgpt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chatgpt::{ConversationContent, ConversationMessage};

    fn config(base: &str, token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            backend_base_url: base.to_string(),
            access_token: token.map(str::to_string),
            request_timeout: std::time::Duration::from_millis(2000),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            ChatGptBackend::from_config(&config("not a url", None)),
            Err(ProxyError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_bearer_prefers_configured_token() {
        let backend = ChatGptBackend::from_config(&config("https://chatgpt.com", Some("cfg")))
            .unwrap();
        assert_eq!(backend.bearer(Some("caller")), Some("cfg"));

        let backend = ChatGptBackend::from_config(&config("https://chatgpt.com", None)).unwrap();
        assert_eq!(backend.bearer(Some("caller")), Some("caller"));
        assert_eq!(backend.bearer(None), None);
    }

    #[test]
    fn test_paths_join_against_host() {
        let backend =
            ChatGptBackend::from_config(&config("https://chat.example.com/sub/", None)).unwrap();
        assert_eq!(
            backend.url(USER_SETTINGS_PATH).unwrap().as_str(),
            "https://chat.example.com/backend-api/settings/user"
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = ChatGptBackend::from_config(&config("http://127.0.0.1:1", None)).unwrap();
        let request = ConversationRequest {
            action: "next".to_string(),
            messages: vec![ConversationMessage {
                role: "user".to_string(),
                content: ConversationContent {
                    content_type: "text".to_string(),
                    parts: vec!["hi".to_string()],
                },
            }],
            model: "gpt-4".to_string(),
            parent_message_id: "p".to_string(),
            conversation_id: None,
        };

        let err = match backend.conversation(&request, None).await {
            Err(e) => e,
            Ok(_) => panic!("expected a transport error"),
        };
        assert!(err.is_transport());

        let err = backend.models(None).await.unwrap_err();
        assert!(err.is_transport());
    }
}

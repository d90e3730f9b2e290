//! 模型列表处理器

use crate::error::GatewayError;
use crate::models::openai::{ModelInfo, ModelList, ModelPermission};
use crate::resilience::{default_models, mock_models, should_use_mock};
use crate::server::AppState;
use crate::server_utils::bearer_token;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};

/// `GET /v1/models`
pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> Response {
    tracing::info!("[TRANSLIT] 收到模型列表请求");

    let caller_token = bearer_token(&headers);
    match state.backend.models(caller_token.as_deref()).await {
        Ok(raw) => {
            let list = map_models(&raw);
            tracing::info!(
                "[TRANSLIT] 返回 {} 个模型: {:?}",
                list.data.len(),
                list.data.iter().map(|m| m.id.as_str()).collect::<Vec<_>>()
            );
            Json(list).into_response()
        }
        Err(err) => {
            tracing::error!("[TRANSLIT] 模型列表出错: {}", err);
            if should_use_mock(&err) {
                return Json(mock_models()).into_response();
            }
            let err = GatewayError::Proxy {
                message: err.to_string(),
                code: err.code().unwrap_or("unknown_error").to_string(),
            };
            err.log_with_context("/v1/models");
            err.into_response()
        }
    }
}

/// 后端模型列表转换为 OpenAI 格式
///
/// 后端没有返回任何模型时使用默认的三个模型。
pub fn map_models(raw: &serde_json::Value) -> ModelList {
    let created = chrono::Utc::now().timestamp();

    let data: Vec<ModelInfo> = raw
        .get("models")
        .and_then(|m| m.as_array())
        .map(|models| models.iter().map(|m| map_model(m, created)).collect())
        .unwrap_or_default();

    if data.is_empty() {
        return default_models();
    }

    ModelList {
        object: "list".to_string(),
        data,
    }
}

fn map_model(model: &serde_json::Value, created: i64) -> ModelInfo {
    let name = |key: &str| {
        model
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    };
    let slug = name("slug").or_else(|| name("id"));

    ModelInfo {
        id: slug.unwrap_or("unknown-model").to_string(),
        object: "model".to_string(),
        created,
        owned_by: "openai".to_string(),
        permission: Some(vec![ModelPermission {
            id: format!("modelperm-{}", slug.unwrap_or("unknown")),
            object: "model_permission".to_string(),
            created,
            allow_create_engine: false,
            allow_sampling: true,
            allow_logprobs: true,
            allow_search_indices: false,
            allow_view: true,
            allow_fine_tuning: false,
            organization: "*".to_string(),
            group: None,
            is_blocking: false,
        }]),
    }
}

//! 用户信息处理器
//!
//! 并发请求 `/backend-api/me` 与 `/backend-api/settings/user`，
//! 尽力合并为一个用户对象。任一调用失败都只当作缺失处理。

use crate::backends::{BackendError, BackendResult};
use crate::models::openai::UserProfile;
use crate::resilience::{mock_user, should_use_mock};
use crate::server::AppState;
use crate::server_utils::bearer_token;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

/// `GET /v1/me`
pub async fn me(state: State<AppState>, headers: HeaderMap) -> Response {
    user_profile(state, headers, "/v1/me").await
}

/// `GET /v1/whoami`
pub async fn whoami(state: State<AppState>, headers: HeaderMap) -> Response {
    user_profile(state, headers, "/v1/whoami").await
}

/// `GET /v1/profile`
pub async fn profile(state: State<AppState>, headers: HeaderMap) -> Response {
    user_profile(state, headers, "/v1/profile").await
}

async fn user_profile(State(state): State<AppState>, headers: HeaderMap, route: &str) -> Response {
    tracing::info!("[TRANSLIT] 收到用户信息请求: {}", route);

    let caller_token = bearer_token(&headers);
    let (me_res, settings_res) = tokio::join!(
        state.backend.me(caller_token.as_deref()),
        state.backend.user_settings(caller_token.as_deref())
    );

    if let Some(err) = mock_trigger(&me_res, &settings_res) {
        if should_use_mock(err) {
            return Json(mock_user(route)).into_response();
        }
    }

    let me = usable("/backend-api/me", me_res);
    let settings = usable("/backend-api/settings/user", settings_res);
    let profile = merge_profile(me.as_ref(), settings.as_ref(), chrono::Utc::now().timestamp());

    tracing::info!(
        "[TRANSLIT] 返回用户信息: id={} has_email={} has_name={}",
        profile.id,
        profile.email.is_some(),
        profile.name.is_some()
    );
    Json(profile).into_response()
}

/// 两个调用都在传输层失败时返回第一个错误
fn mock_trigger<'a>(
    me: &'a BackendResult<Value>,
    settings: &'a BackendResult<Value>,
) -> Option<&'a BackendError> {
    match (me, settings) {
        (Err(a), Err(b)) if a.is_transport() && b.is_transport() => Some(a),
        _ => None,
    }
}

fn usable(path: &str, result: BackendResult<Value>) -> Option<Value> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("[TRANSLIT] 获取 {} 失败: {}", path, e);
            None
        }
    }
}

/// 非空字符串字段
fn text_field(value: Option<&Value>, key: &str) -> Option<String> {
    value?
        .get(key)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 非空的任意字段
fn present_field(value: Option<&Value>, key: &str) -> Option<Value> {
    let field = value?.get(key)?;
    let empty = match field {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    (!empty).then(|| field.clone())
}

/// 解析 `created`：RFC3339 字符串或数值时间戳（秒或毫秒）
fn parse_created(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp()),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() || raw <= 0.0 {
                None
            } else if raw > 1e12 {
                Some((raw / 1000.0) as i64)
            } else {
                Some(raw as i64)
            }
        }
        _ => None,
    }
}

/// 合并两个后端响应
pub fn merge_profile(me: Option<&Value>, settings: Option<&Value>, now: i64) -> UserProfile {
    UserProfile {
        id: text_field(me, "id").unwrap_or_else(|| "user-unknown".to_string()),
        object: "user".to_string(),
        email: text_field(me, "email").or_else(|| text_field(settings, "email")),
        name: text_field(me, "name").or_else(|| text_field(settings, "name")),
        picture: text_field(me, "picture").or_else(|| text_field(me, "image")),
        created: me
            .and_then(|m| m.get("created"))
            .and_then(parse_created)
            .unwrap_or(now),
        preferences: present_field(settings, "preferences"),
        locale: present_field(settings, "locale"),
    }
}

//! 对话补全处理器
//!
//! 流式请求走转发模式，收到一个快照就下发一个 chunk；
//! 非流式请求走累积模式，读完整条后端流后一次性返回。
//! 后端不可用时由降级策略替换为模拟响应。

use crate::backends::{BackendError, ByteStream};
use crate::error::GatewayError;
use crate::models::openai::ChatCompletionRequest;
use crate::resilience::{mock_completion, mock_stream, should_use_mock, MOCK_CHUNK_DELAY};
use crate::server::AppState;
use crate::server_utils::{bearer_token, sse_response, thread_id};
use crate::session::{ContinuationRecord, SessionManager};
use crate::stream::{accumulate, relay, CapturedIds, RelayEvent};
use crate::translator::{
    completion_from_accumulated, ChatGptRequestTranslator, ChatGptResponseTranslator,
    RequestTranslator, ResponseTranslator,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;

const ROUTE: &str = "/v1/chat/completions";

/// 一次请求的延续上下文
#[derive(Clone)]
struct Continuity {
    sessions: SessionManager,
    /// 用于计算存储键的凭证，为空时不做延续
    credential: Option<String>,
    thread: String,
}

impl Continuity {
    /// 读取已记住的延续信息并续期
    ///
    /// 存储失败只记录日志，按全新线程处理。
    async fn load(&self) -> ContinuationRecord {
        let Some(token) = self.credential.as_deref() else {
            return ContinuationRecord::default();
        };

        let record = match self.sessions.get_continuation(token, &self.thread).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("[SESSION] 读取会话失败，按新线程处理: {}", e);
                ContinuationRecord::default()
            }
        };
        if let Err(e) = self.sessions.touch_session(token, &self.thread).await {
            tracing::warn!("[SESSION] 会话续期失败: {}", e);
        }
        record
    }

    /// 保存本轮捕获的后端标识，失败只记录日志
    async fn save(&self, ids: &CapturedIds) {
        let Some(token) = self.credential.as_deref() else {
            return;
        };
        if ids.conversation_id.is_none() && ids.message_id.is_none() {
            return;
        }

        match self
            .sessions
            .store_continuation(
                token,
                &self.thread,
                ids.conversation_id.as_deref(),
                ids.message_id.as_deref(),
            )
            .await
        {
            Ok(()) => tracing::debug!(
                "[SESSION] 已保存线程 {} 的延续信息: conversation={:?}",
                self.thread,
                ids.conversation_id
            ),
            Err(e) => tracing::warn!("[SESSION] 保存会话失败: {}", e),
        }
    }
}

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = GatewayError::InvalidRequest(rejection.body_text());
            err.log_with_context(ROUTE);
            return err.into_response();
        }
    };

    tracing::info!(
        "[TRANSLIT] 收到 chat completion 请求: stream={} model={:?} messages={}",
        request.is_streaming(),
        request.model,
        request.messages.len()
    );

    let caller_token = bearer_token(&headers);
    let continuity = Continuity {
        sessions: state.sessions.clone(),
        credential: caller_token
            .clone()
            .or_else(|| state.config.access_token.clone()),
        thread: thread_id(&headers),
    };

    let translator = ChatGptRequestTranslator::with_continuation(continuity.load().await);
    let payload = match translator.translate_request(&request) {
        Ok(payload) => payload,
        Err(e) => {
            let err = GatewayError::from(e);
            err.log_with_context(ROUTE);
            return err.into_response();
        }
    };
    tracing::info!(
        "[TRANSLIT] 已转换为后端格式: action={} model={} continuing={}",
        payload.action,
        payload.model,
        payload.conversation_id.is_some()
    );

    let model = request
        .requested_model()
        .unwrap_or(&payload.model)
        .to_string();

    let body = match state
        .backend
        .conversation(&payload, caller_token.as_deref())
        .await
    {
        Ok(body) => body,
        Err(err) => return backend_failure(&request, err),
    };

    if request.is_streaming() {
        relay_response(body, model, continuity)
    } else {
        accumulate_response(&request, body, &model, &continuity).await
    }
}

/// 转发模式
fn relay_response(body: ByteStream, model: String, continuity: Continuity) -> Response {
    tracing::info!("[TRANSLIT] 开始转发流式响应");

    let events = async_stream::stream! {
        let mut translator = ChatGptResponseTranslator::new(model);
        let mut relayed = Box::pin(relay(body));

        while let Some(item) = relayed.next().await {
            match item {
                Ok(event) => {
                    if let RelayEvent::Done { ids, terminated } = &event {
                        if *terminated || ids.is_complete() {
                            continuity.save(ids).await;
                        }
                    }
                    if let Some(out) = translator.translate_event(&event) {
                        for sse in out {
                            yield sse;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("[TRANSLIT] 流式转发出错: {}", e);
                    yield GatewayError::StreamProcessing.to_sse_event();
                    return;
                }
            }
        }
        tracing::info!("[TRANSLIT] 流式响应结束: id={}", translator.response_id());
    };

    sse_response(events)
}

/// 累积模式
async fn accumulate_response(
    request: &ChatCompletionRequest,
    body: ByteStream,
    model: &str,
    continuity: &Continuity,
) -> Response {
    tracing::info!("[TRANSLIT] 累积后端流以生成非流式响应");

    let result = match accumulate(body).await {
        Ok(result) => result,
        Err(err) => return backend_failure(request, err),
    };

    match completion_from_accumulated(&result, model) {
        Ok(response) => {
            continuity.save(&result.ids()).await;
            tracing::info!(
                "[TRANSLIT] 已转换为 OpenAI 格式: id={} model={} content_len={}",
                response.id,
                response.model,
                result.content.len()
            );
            Json(response).into_response()
        }
        Err(e) => {
            let err = GatewayError::from(e);
            err.log_with_context(ROUTE);
            err.into_response()
        }
    }
}

/// 后端调用失败：可降级时返回模拟响应，否则返回错误
fn backend_failure(request: &ChatCompletionRequest, err: BackendError) -> Response {
    tracing::error!("[TRANSLIT] ChatGPT 补全出错 ({}): {}", err.kind, err);

    if should_use_mock(&err) {
        return if request.is_streaming() {
            sse_response(mock_stream(request, MOCK_CHUNK_DELAY))
        } else {
            Json(mock_completion(request)).into_response()
        };
    }

    let gateway_err = GatewayError::CompletionFailed {
        code: err.code().unwrap_or("unknown_error").to_string(),
    };
    gateway_err.log_with_context(ROUTE);
    if request.is_streaming() {
        sse_response(futures::stream::once(async move {
            gateway_err.to_sse_event()
        }))
    } else {
        gateway_err.into_response()
    }
}

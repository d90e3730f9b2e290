//! 模拟响应
//!
//! 后端环境不可用时替代真实响应，让调用方仍能验证网关本身是通的。

use crate::models::openai::{
    ChatCompletionChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChunkDelta, ModelInfo, ModelList, ResponseMessage, Usage, UserProfile,
};
use crate::stream::generators::{encode_chunk, OpenAiSseGenerator, DONE_EVENT};
use futures::Stream;
use std::time::Duration;

/// 模拟响应的默认模型
pub const MOCK_MODEL: &str = "gpt-4";

pub const MOCK_COMPLETION_TEXT: &str = "Hello! This is a mock response from CharGPT proxy. The real ChatGPT backend is not available, but the proxy is working correctly.";

pub const MOCK_STREAM_TEXT: &str = "Hello! This is a mock streaming response from CharGPT proxy. The real ChatGPT backend is not available, but the proxy is working correctly.";

/// 模拟流中相邻 chunk 的间隔
pub const MOCK_CHUNK_DELAY: Duration = Duration::from_millis(50);

/// 默认的三个模型
pub const DEFAULT_MODELS: [&str; 3] = ["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"];

const MOCK_COMPLETION_TOKENS: u64 = 25;
const MOCK_TOTAL_TOKENS: u64 = 75;
const MOCK_DEFAULT_PROMPT_TOKENS: u64 = 50;

fn mock_model(request: &ChatCompletionRequest) -> String {
    request.requested_model().unwrap_or(MOCK_MODEL).to_string()
}

fn mock_id() -> String {
    format!("chatcmpl-mock-{}", chrono::Utc::now().timestamp_millis())
}

/// 非流式模拟响应
///
/// `prompt_tokens` 为所有消息内容的字符数之和，为 0 时取 50。
pub fn mock_completion(request: &ChatCompletionRequest) -> ChatCompletionResponse {
    tracing::info!("[MOCK] 生成模拟 chat completion 响应");

    let prompt_tokens = match request.content_chars() as u64 {
        0 => MOCK_DEFAULT_PROMPT_TOKENS,
        n => n,
    };

    ChatCompletionResponse {
        id: mock_id(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: mock_model(request),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: MOCK_COMPLETION_TEXT.to_string(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage {
            prompt_tokens,
            completion_tokens: MOCK_COMPLETION_TOKENS,
            total_tokens: MOCK_TOTAL_TOKENS,
        },
    }
}

/// 流式模拟 chunk
///
/// 按空格切分固定文本，除第一个词外每个 delta 前带一个空格，
/// 最后是一个空 delta 的结束 chunk。
pub fn mock_stream_chunks(request: &ChatCompletionRequest) -> Vec<ChatCompletionChunk> {
    tracing::info!("[MOCK] 生成模拟流式 chat completion 响应");

    let generator = OpenAiSseGenerator::with_id(mock_id(), mock_model(request));
    let mut chunks: Vec<ChatCompletionChunk> = MOCK_STREAM_TEXT
        .split(' ')
        .enumerate()
        .map(|(i, word)| {
            let content = if i > 0 {
                format!(" {}", word)
            } else {
                word.to_string()
            };
            generator.chunk(
                ChunkDelta {
                    role: None,
                    content: Some(content),
                },
                None,
            )
        })
        .collect();
    chunks.push(generator.chunk(ChunkDelta::default(), Some("stop")));
    chunks
}

/// 以固定间隔输出模拟 chunk，最后输出 `[DONE]`
pub fn mock_stream(
    request: &ChatCompletionRequest,
    delay: Duration,
) -> impl Stream<Item = String> + Send + 'static {
    let chunks = mock_stream_chunks(request);
    async_stream::stream! {
        for chunk in chunks {
            if let Some(event) = encode_chunk(&chunk) {
                yield event;
            }
            tokio::time::sleep(delay).await;
        }
        yield DONE_EVENT.to_string();
    }
}

/// 模拟模型列表
pub fn mock_models() -> ModelList {
    tracing::info!("[MOCK] 生成模拟模型列表");
    default_models()
}

/// 默认模型列表，不带权限信息
pub fn default_models() -> ModelList {
    let created = chrono::Utc::now().timestamp();
    ModelList {
        object: "list".to_string(),
        data: DEFAULT_MODELS
            .iter()
            .map(|id| ModelInfo::basic(id, created))
            .collect(),
    }
}

/// 模拟用户信息
pub fn mock_user(route: &str) -> UserProfile {
    tracing::info!("[MOCK] 为 {} 生成模拟用户信息", route);
    UserProfile {
        id: "user-mock-12345".to_string(),
        object: "user".to_string(),
        email: Some("mock-user@example.com".to_string()),
        name: Some("Mock User".to_string()),
        picture: None,
        created: chrono::Utc::now().timestamp(),
        preferences: None,
        locale: None,
    }
}

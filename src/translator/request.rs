//! OpenAI 请求转换为 ChatGPT 后端请求
//!
//! 只转发最后一条消息，历史由后端通过 conversation id 自行维护。
//! 没有记住的 parent message id 时生成新的 UUID，作为全新线程。

use crate::models::chatgpt::{ConversationContent, ConversationMessage, ConversationRequest};
use crate::models::openai::ChatCompletionRequest;
use crate::session::ContinuationRecord;
use crate::translator::traits::{RequestTranslator, TranslateError};
use uuid::Uuid;

/// 请求未指定模型时使用的默认模型
pub const DEFAULT_MODEL: &str = "gpt-4-1-mini";

/// OpenAI 到 ChatGPT 后端的请求转换器
///
/// 每个请求创建一个，携带该线程已记住的延续信息。
#[derive(Debug, Clone, Default)]
pub struct ChatGptRequestTranslator {
    continuation: ContinuationRecord,
}

impl ChatGptRequestTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用已记住的延续信息创建
    pub fn with_continuation(continuation: ContinuationRecord) -> Self {
        Self { continuation }
    }
}

impl RequestTranslator for ChatGptRequestTranslator {
    type Input = ChatCompletionRequest;
    type Output = ConversationRequest;
    type Error = TranslateError;

    fn translate_request(&self, request: &Self::Input) -> Result<Self::Output, Self::Error> {
        translate(request, &self.continuation)
    }
}

/// 转换请求
///
/// `messages` 为空时返回错误；最后一条消息内容为空或为 null 时发送空文本。
pub fn translate(
    request: &ChatCompletionRequest,
    continuation: &ContinuationRecord,
) -> Result<ConversationRequest, TranslateError> {
    let last = request
        .messages
        .last()
        .ok_or_else(|| TranslateError::missing_field("messages"))?;
    let text = last
        .content
        .as_ref()
        .map(|c| c.text())
        .unwrap_or_default();

    let parent_message_id = continuation
        .parent_message_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(ConversationRequest {
        action: "next".to_string(),
        messages: vec![ConversationMessage {
            role: "user".to_string(),
            content: ConversationContent {
                content_type: "text".to_string(),
                parts: vec![text],
            },
        }],
        model: request
            .requested_model()
            .unwrap_or(DEFAULT_MODEL)
            .to_string(),
        parent_message_id,
        conversation_id: continuation
            .conversation_id
            .clone()
            .filter(|id| !id.is_empty()),
    })
}

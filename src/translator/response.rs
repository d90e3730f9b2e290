//! ChatGPT 后端结果转换为 OpenAI 响应
//!
//! - 非流式：累积结果 → `chat.completion`
//! - 流式：`RelayEvent` → `chat.completion.chunk` SSE

use crate::models::openai::{
    ChatCompletionChoice, ChatCompletionResponse, ResponseMessage, Usage,
};
use crate::stream::{AccumulatedResult, OpenAiSseGenerator, RelayEvent};
use crate::translator::traits::{ResponseTranslator, TranslateError};

/// 累积结果转换为非流式响应
///
/// 没有后端分配的 message id 时无法表示为 completion，返回错误。
/// 后端不提供 token 统计，usage 全部为 0。
pub fn completion_from_accumulated(
    result: &AccumulatedResult,
    model: &str,
) -> Result<ChatCompletionResponse, TranslateError> {
    if !result.success {
        return Err(TranslateError::invalid_response(
            result
                .error
                .clone()
                .unwrap_or_else(|| "backend stream was not successful".to_string()),
        ));
    }
    let message_id = result
        .message_id
        .as_deref()
        .ok_or_else(|| TranslateError::invalid_response("backend response has no message id"))?;

    Ok(ChatCompletionResponse {
        id: format!("chatcmpl-{}", message_id),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: result.content.clone(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::default(),
    })
}

/// 流式响应转换器
#[derive(Debug)]
pub struct ChatGptResponseTranslator {
    generator: OpenAiSseGenerator,
}

impl ChatGptResponseTranslator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            generator: OpenAiSseGenerator::new(model),
        }
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// 当前 chunk id
    pub fn response_id(&self) -> &str {
        self.generator.response_id()
    }
}

impl ResponseTranslator for ChatGptResponseTranslator {
    type Output = Vec<String>;

    fn translate_event(&mut self, event: &RelayEvent) -> Option<Self::Output> {
        let events = self.generator.generate(event);
        if events.is_empty() {
            None
        } else {
            Some(events)
        }
    }
}

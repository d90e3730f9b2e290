//! OpenAI SSE 生成器
//!
//! 将 `RelayEvent` 转换为 OpenAI Chat Completions SSE 格式。
//!
//! # 格式说明
//!
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}
//!
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```

use crate::models::openai::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use crate::stream::events::RelayEvent;

/// 尚未见到 message id 时使用的 chunk id
pub const STREAMING_PLACEHOLDER_ID: &str = "chatcmpl-streaming";

/// 流结束标记
pub const DONE_EVENT: &str = "data: [DONE]\n\n";

/// OpenAI SSE 生成器
#[derive(Debug)]
pub struct OpenAiSseGenerator {
    /// 模型名称
    model: String,
    /// 创建时间戳（秒）
    created: i64,
    /// 当前 chunk id，随后端 message id 更新
    response_id: String,
}

impl OpenAiSseGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            response_id: STREAMING_PLACEHOLDER_ID.to_string(),
        }
    }

    /// 使用固定的响应 ID，不随后端 message id 变化
    pub fn with_id(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            response_id: id.into(),
            ..Self::new(model)
        }
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 将事件转换为 SSE 字符串
    ///
    /// `Delta` 生成一个内容 chunk；`Done` 生成结束 chunk 和 `[DONE]`。
    pub fn generate(&mut self, event: &RelayEvent) -> Vec<String> {
        match event {
            RelayEvent::Delta {
                content,
                message_id,
            } => {
                if let Some(mid) = message_id {
                    self.response_id = format!("chatcmpl-{}", mid);
                }
                let delta = ChunkDelta {
                    role: None,
                    content: Some(content.clone()),
                };
                self.chunk_event(delta, None).into_iter().collect()
            }
            RelayEvent::Done { ids, .. } => {
                if let Some(mid) = &ids.message_id {
                    self.response_id = format!("chatcmpl-{}", mid);
                }
                let mut out: Vec<String> = self
                    .chunk_event(ChunkDelta::default(), Some("stop"))
                    .into_iter()
                    .collect();
                out.push(DONE_EVENT.to_string());
                out
            }
        }
    }

    /// 构建一个 chunk
    pub fn chunk(&self, delta: ChunkDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.response_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    /// 构建一个 chunk 并编码为 SSE 事件
    pub fn chunk_event(&self, delta: ChunkDelta, finish_reason: Option<&str>) -> Option<String> {
        encode_chunk(&self.chunk(delta, finish_reason))
    }
}

/// 编码为 `data: {...}\n\n`
pub fn encode_chunk(chunk: &ChatCompletionChunk) -> Option<String> {
    match serde_json::to_string(chunk) {
        Ok(json) => Some(format!("data: {}\n\n", json)),
        Err(e) => {
            tracing::error!("[TRANSLIT] chunk 序列化失败: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::CapturedIds;

    fn payload(sse: &str) -> serde_json::Value {
        serde_json::from_str(sse.trim_start_matches("data: ").trim()).unwrap()
    }

    #[test]
    fn test_delta_before_message_id_uses_placeholder() {
        let mut generator = OpenAiSseGenerator::new("gpt-4");
        let out = generator.generate(&RelayEvent::Delta {
            content: "Hello".to_string(),
            message_id: None,
        });
        assert_eq!(out.len(), 1);
        let json = payload(&out[0]);
        assert_eq!(json["id"], "chatcmpl-streaming");
        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["choices"][0]["delta"]["content"], "Hello");
        assert!(json["choices"][0]["finish_reason"].is_null());
    }

    #[test]
    fn test_delta_uses_message_id() {
        let mut generator = OpenAiSseGenerator::new("gpt-4");
        let out = generator.generate(&RelayEvent::Delta {
            content: "Hi".to_string(),
            message_id: Some("m1".to_string()),
        });
        assert_eq!(payload(&out[0])["id"], "chatcmpl-m1");
        assert_eq!(generator.response_id(), "chatcmpl-m1");
    }

    #[test]
    fn test_done_emits_stop_chunk_then_sentinel() {
        let mut generator = OpenAiSseGenerator::new("gpt-4");
        let out = generator.generate(&RelayEvent::Done {
            ids: CapturedIds {
                conversation_id: Some("c".to_string()),
                message_id: Some("m9".to_string()),
            },
            terminated: true,
        });
        assert_eq!(out.len(), 2);
        let json = payload(&out[0]);
        assert_eq!(json["id"], "chatcmpl-m9");
        assert_eq!(json["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(out[1], "data: [DONE]\n\n");
    }

    #[test]
    fn test_with_id_keeps_fixed_id_until_message_id() {
        let generator = OpenAiSseGenerator::with_id("chatcmpl-mock-1", "m");
        let json = payload(
            &generator
                .chunk_event(
                    ChunkDelta {
                        role: None,
                        content: Some(" word".to_string()),
                    },
                    None,
                )
                .unwrap(),
        );
        assert_eq!(json["id"], "chatcmpl-mock-1");
        assert_eq!(json["choices"][0]["delta"]["content"], " word");
    }
}

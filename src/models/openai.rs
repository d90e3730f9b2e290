//! OpenAI Chat Completions 数据结构
//!
//! 网关对外暴露的请求、响应与流式 chunk 格式。

use serde::{Deserialize, Serialize};

/// 对话补全请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// 只有显式的 `true` 才走流式，`null` 与缺省都按非流式处理
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatCompletionRequest {
    /// 是否请求流式响应
    pub fn is_streaming(&self) -> bool {
        self.stream == Some(true)
    }

    /// 请求中给出的模型名，空字符串视为未给出
    pub fn requested_model(&self) -> Option<&str> {
        self.model.as_deref().filter(|m| !m.is_empty())
    }

    /// 所有消息内容的字符数之和
    pub fn content_chars(&self) -> usize {
        self.messages
            .iter()
            .filter_map(|m| m.content.as_ref())
            .map(MessageContent::char_len)
            .sum()
    }
}

/// 对话消息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

/// 消息内容：纯文本或多段内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// 提取文本，多段内容之间以换行连接
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// 文本字符数
    pub fn char_len(&self) -> usize {
        match self {
            MessageContent::Text(s) => s.chars().count(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.chars().count(),
                    _ => 0,
                })
                .sum(),
        }
    }
}

/// 内容片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: serde_json::Value,
    },
    #[serde(other)]
    Unsupported,
}

/// 非流式响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// 流式 chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// 流式 choice，`finish_reason` 未结束时序列化为 `null`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// 模型列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<Vec<ModelPermission>>,
}

impl ModelInfo {
    /// 不带权限信息的模型条目
    pub fn basic(id: &str, created: i64) -> Self {
        Self {
            id: id.to_string(),
            object: "model".to_string(),
            created,
            owned_by: "openai".to_string(),
            permission: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPermission {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub allow_create_engine: bool,
    pub allow_sampling: bool,
    pub allow_logprobs: bool,
    pub allow_search_indices: bool,
    pub allow_view: bool,
    pub allow_fine_tuning: bool,
    pub organization: String,
    pub group: Option<String>,
    pub is_blocking: bool,
}

/// 用户信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub object: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: ChatCompletionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.messages.is_empty());
        assert!(!req.is_streaming());
        assert_eq!(req.requested_model(), None);

        let req: ChatCompletionRequest =
            serde_json::from_str(r#"{"model":"","messages":[]}"#).unwrap();
        assert_eq!(req.requested_model(), None);
    }

    #[test]
    fn test_stream_flag_only_true_streams() {
        for (body, expected) in [
            (r#"{"stream":true}"#, true),
            (r#"{"stream":false}"#, false),
            (r#"{"stream":null}"#, false),
            ("{}", false),
        ] {
            let req: ChatCompletionRequest = serde_json::from_str(body).unwrap();
            assert_eq!(req.is_streaming(), expected, "{}", body);
        }
    }

    #[test]
    fn test_message_content_variants() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"messages":[
                {"role":"system","content":"be nice"},
                {"role":"user","content":[
                    {"type":"text","text":"look"},
                    {"type":"image_url","image_url":{"url":"data:x"}},
                    {"type":"input_audio","input_audio":{}},
                    {"type":"text","text":"here"}
                ]},
                {"role":"assistant","content":null}
            ]}"#,
        )
        .unwrap();

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[1].content.as_ref().unwrap().text(), "look\nhere");
        assert!(req.messages[2].content.is_none());
        assert_eq!(req.content_chars(), "be nice".len() + "look".len() + "here".len());
    }

    #[test]
    fn test_chunk_serializes_null_finish_reason() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1,
            model: "gpt-4".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: None,
            }],
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert!(json["choices"][0]["finish_reason"].is_null());
        assert_eq!(json["choices"][0]["delta"], serde_json::json!({}));
    }

    #[test]
    fn test_basic_model_has_no_permission_field() {
        let json = serde_json::to_value(ModelInfo::basic("gpt-4", 0)).unwrap();
        assert!(json.get("permission").is_none());
        assert_eq!(json["owned_by"], "openai");
    }
}

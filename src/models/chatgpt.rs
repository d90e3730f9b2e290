//! ChatGPT 后端数据结构
//!
//! 后端请求格式：
//! ```text
//! {"action":"next","messages":[{"role":"user","content":{"content_type":"text","parts":["..."]}}],
//!  "model":"...","parent_message_id":"...","conversation_id":"..."}
//! ```
//!
//! 后端流事件（每行 `data: {...}`）中的 `message.content.parts[0]`
//! 是截至当前的完整文本，而不是增量。

use serde::{Deserialize, Serialize};

/// 对话请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub action: String,
    pub messages: Vec<ConversationMessage>,
    pub model: String,
    pub parent_message_id: String,
    /// 没有既有会话时必须省略，不能发送 null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: ConversationContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContent {
    pub content_type: String,
    pub parts: Vec<String>,
}

/// 流事件 payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatGptStreamEvent {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message: Option<ChatGptMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatGptMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<ChatGptContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatGptContent {
    #[serde(default)]
    pub parts: Option<Vec<serde_json::Value>>,
}

impl ChatGptStreamEvent {
    /// `message.id`
    pub fn message_id(&self) -> Option<&str> {
        self.message.as_ref()?.id.as_deref()
    }

    /// `message.content.parts[0]`，仅当它是字符串时返回
    pub fn snapshot(&self) -> Option<&str> {
        self.message.as_ref()?.content.as_ref()?.parts.as_ref()?.first()?.as_str()
    }
}

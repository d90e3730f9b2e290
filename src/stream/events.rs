//! 流事件类型
//!
//! 解析器与重组器之间、重组器与生成器之间的中间表示：
//!
//! - `BackendEvent`: 后端一行 `data:` 解析后的结果
//! - `RelayEvent`: 转发模式下交给下游的事件
//! - `AccumulatedResult`: 累积模式下整条流的最终结果

use crate::models::chatgpt::ChatGptStreamEvent;
use serde::Serialize;

/// 后端流中一行有效 `data:` 的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// JSON payload
    Payload(ChatGptStreamEvent),
    /// 字面量 `[DONE]`
    Done,
}

/// 流中捕获到的后端标识
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapturedIds {
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
}

impl CapturedIds {
    /// 两个标识都已捕获
    pub fn is_complete(&self) -> bool {
        self.conversation_id.is_some() && self.message_id.is_some()
    }
}

/// 转发模式事件
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// 新的完整文本快照，作为 delta 原样下发
    Delta {
        content: String,
        /// 产生该快照时已知的 message id
        message_id: Option<String>,
    },
    /// 流结束
    Done {
        ids: CapturedIds,
        /// 是否收到了后端的 `[DONE]`
        terminated: bool,
    },
}

/// 累积模式结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatedResult {
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub content: String,
    pub success: bool,
    /// `success` 为 false 时的失败描述
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccumulatedResult {
    pub fn ids(&self) -> CapturedIds {
        CapturedIds {
            conversation_id: self.conversation_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

//! 数据模型
//!
//! - `openai`: 网关对外的 OpenAI 兼容格式
//! - `chatgpt`: ChatGPT 后端的原生格式

pub mod chatgpt;
pub mod openai;

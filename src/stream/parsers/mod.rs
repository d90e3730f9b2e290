//! 流式数据解析器
//!
//! 解析后端的流式响应格式，输出 `BackendEvent`。

pub mod chatgpt_sse;

pub use chatgpt_sse::{ChatGptSseParser, LineBuffer};

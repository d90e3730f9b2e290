//! SSE 流生成器
//!
//! 将重组后的 `RelayEvent` 转换为前端协议的 SSE 格式。

pub mod openai_sse;

pub use openai_sse::{encode_chunk, OpenAiSseGenerator, DONE_EVENT, STREAMING_PLACEHOLDER_ID};

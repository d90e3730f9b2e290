//! 协议转换层
//!
//! 处理 OpenAI 前端协议与 ChatGPT 后端之间的请求和响应格式转换。
//!
//! ```text
//! translator/
//! ├── traits.rs      # 转换器 trait 定义
//! ├── request.rs     # OpenAI → ChatGPT 请求
//! └── response.rs    # 累积结果 / RelayEvent → OpenAI 响应
//! ```
//!
//! # 调用链
//!
//! ```text
//! ChatCompletionRequest + ContinuationRecord
//!   → [request.rs] translate
//!   → ConversationRequest
//!   → [backends/chatgpt.rs] conversation
//!   → 后端 SSE 字节流
//!   → [stream/reassembler.rs] relay | accumulate
//!   → [response.rs] ChatGptResponseTranslator | completion_from_accumulated
//!   → OpenAI SSE | chat.completion
//! ```

pub mod request;
pub mod response;
pub mod traits;

pub use request::{translate, ChatGptRequestTranslator, DEFAULT_MODEL};
pub use response::{completion_from_accumulated, ChatGptResponseTranslator};
pub use traits::{RequestTranslator, ResponseTranslator, TranslateError, TranslateErrorKind};

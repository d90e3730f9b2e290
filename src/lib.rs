//! ChatGPT 后端的 OpenAI 兼容网关
//!
//! 接收 OpenAI Chat Completions 格式的请求，转换为 ChatGPT 后端的
//! 对话请求，再把后端的快照式 SSE 流重组为 OpenAI 的增量 chunk
//! 或一次性的补全响应。按凭证和线程记住后端的对话 id，
//! 让多轮请求在同一个后端对话中延续。

pub mod backends;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod proxy;
pub mod resilience;
pub mod server;
pub mod server_utils;
pub mod session;
pub mod stream;
pub mod translator;

pub use backends::{ChatBackend, ChatGptBackend};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use server::{build_router, AppState};
pub use session::SessionManager;

//! 流式处理层
//!
//! - 事件类型定义 (events)
//! - 后端流格式解析 (parsers)
//! - 流重组，转发与累积两种模式 (reassembler)
//! - 前端流格式生成 (generators)
//!
//! ```text
//! 后端字节流 ──> [ChatGptSseParser] ──> BackendEvent ──> [RelayReassembler] ──> RelayEvent ──> [OpenAiSseGenerator] ──> OpenAI SSE
//!                                                    └─> [Accumulator] ──> AccumulatedResult
//! ```

pub mod events;
pub mod generators;
pub mod parsers;
pub mod reassembler;

pub use events::{AccumulatedResult, BackendEvent, CapturedIds, RelayEvent};
pub use generators::{OpenAiSseGenerator, DONE_EVENT};
pub use parsers::{ChatGptSseParser, LineBuffer};
pub use reassembler::{accumulate, relay, Accumulator, RelayReassembler, StreamState};

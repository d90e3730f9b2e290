//! 后端调用层
//!
//! 只负责与 ChatGPT 后端的 HTTP 通信，协议转换在 translator 层完成。
//!
//! ```text
//! backends/
//! ├── traits.rs    # ChatBackend trait、BackendError、ByteStream
//! └── chatgpt.rs   # reqwest 实现
//! ```

pub mod chatgpt;
pub mod traits;

pub use chatgpt::ChatGptBackend;
pub use traits::{BackendError, BackendErrorKind, BackendResult, ByteStream, ChatBackend};

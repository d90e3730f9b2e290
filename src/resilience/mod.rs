//! 容错机制模块
//!
//! 后端不可用时的降级判定与模拟响应

pub mod fallback;
pub mod mock;

pub use fallback::{
    should_use_mock, FailureClass, UnavailableCause, CONNECTION_REFUSED_KEYWORDS,
    DNS_FAILURE_KEYWORDS, GENERIC_FAILURE_KEYWORDS, TIMEOUT_KEYWORDS,
};
pub use mock::{
    default_models, mock_completion, mock_models, mock_stream, mock_stream_chunks, mock_user,
    MOCK_CHUNK_DELAY,
};

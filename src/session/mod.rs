//! 会话延续层
//!
//! - `store`: 带 TTL 的键值存储及其多种后端
//! - `manager`: 基于凭证与线程的会话延续读写

pub mod manager;
pub mod store;

pub use manager::{jwt_expiry, ContinuationRecord, SessionManager, DEFAULT_THREAD};
pub use store::{
    select_store, ConversationStore, SharedStore, StoreError, StoreKind, StoreResult,
    STORE_UNAVAILABLE_EXIT_CODE,
};

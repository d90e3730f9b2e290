//! 路由处理器

pub mod chat;
pub mod models;
pub mod user;

pub use chat::chat_completions;
pub use models::{list_models, map_models};
pub use user::{me, merge_profile, profile, whoami};

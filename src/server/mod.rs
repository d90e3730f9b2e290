//! 网关 HTTP 服务
//!
//! 暴露 OpenAI 兼容的子集：
//!
//! - `POST /v1/chat/completions`
//! - `GET /v1/models`
//! - `GET /v1/me`、`/v1/whoami`、`/v1/profile`
//! - `GET /health`
//!
//! 未匹配的路由返回 404 JSON 错误。

pub mod handlers;

use crate::backends::ChatBackend;
use crate::config::GatewayConfig;
use crate::server_utils;
use crate::session::SessionManager;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 请求体大小上限
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// 请求处理共享的状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub backend: Arc<dyn ChatBackend>,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        backend: Arc<dyn ChatBackend>,
        sessions: SessionManager,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            sessions,
        }
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/me", get(handlers::me))
        .route("/v1/whoami", get(handlers::whoami))
        .route("/v1/profile", get(handlers::profile))
        .route("/health", get(server_utils::health))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_SIZE))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .fallback(server_utils::not_found)
        .with_state(state)
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("收到 Ctrl+C，开始优雅关闭"),
        _ = terminate => tracing::info!("收到终止信号，开始优雅关闭"),
    }
}

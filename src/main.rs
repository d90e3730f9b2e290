use chargpt_gateway::config::GatewayConfig;
use chargpt_gateway::logger::init_logging;
use chargpt_gateway::server::{build_router, shutdown_signal, AppState};
use chargpt_gateway::session::{select_store, SessionManager, STORE_UNAVAILABLE_EXIT_CODE};
use chargpt_gateway::ChatGptBackend;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();
    init_logging(config.debug);

    if config.access_token.is_none() {
        tracing::warn!("[PROXY] 未配置访问令牌，将使用调用方的 Bearer 令牌");
    }

    let store = match select_store(&config.session).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("[SESSION] {}", e);
            std::process::exit(STORE_UNAVAILABLE_EXIT_CODE);
        }
    };
    let sessions = SessionManager::new(store, config.session.default_ttl_secs);
    let backend = Arc::new(ChatGptBackend::from_config(&config)?);

    let bind_addr = config.bind_addr();
    let app = build_router(AppState::new(config, backend, sessions));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("[PROXY] 网关已启动: http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("[PROXY] 网关已停止");
    Ok(())
}

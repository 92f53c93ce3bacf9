//! finrag HTTP 服务：POST /chat、/chat/stream、/ingestion/upload 与 /health*
//!
//! 监听 `[server] bind`（环境变量 FINRAG__SERVER__BIND 可覆盖），Ctrl+C / SIGTERM 时优雅退出。

use anyhow::Context;

use finrag::core::{create_services_builder, ShutdownManager};
use finrag::observability::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(Into::into);
    let builder = create_services_builder(config_path);
    let _log_guard = init_logging(&builder.config().app);
    let services = builder.build().context("Failed to build services")?;

    let bind = services.config.server.bind.clone();
    let app = finrag::server::router(services);

    let shutdown = ShutdownManager::new();
    shutdown.listen_for_signals();

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("finrag server: http://{}", bind);

    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

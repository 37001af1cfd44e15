use unipay_gateway::{
    adapters::create_adapters,
    api::routes,
    app_state::AppState,
    config::AppConfig,
    infrastructure::logging::init_logging,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化配置
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    // 初始化日志，guard 需保留到进程退出
    let _log_guard = init_logging(&config.logging)?;

    info!(
        service = %config.service_name,
        environment = %config.environment,
        "Starting payment gateway..."
    );

    // 初始化渠道适配器和应用状态
    let adapters = create_adapters(&config)?;
    let app_state = Arc::new(AppState::new(config.clone(), adapters).await?);
    info!(channels = ?app_state.gateway.supported_channels(), "Payment channels ready");

    // 初始化路由
    let app = routes::create_router(app_state);

    // 启动服务器
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Payment gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

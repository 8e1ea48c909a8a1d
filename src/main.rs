use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use perps_request_server::{
    config, db, docs,
    perps::{BuilderConfig, CounterSequence, KeypairDirectory, TransactionBuilder},
    router,
    solana::EndpointFailoverClient,
    tracker::{run_monitor, JupiterPriceFeed, LogNotifier, PositionLifecycleTracker, TrackerConfig},
};

#[tokio::main]
async fn main() {
    // 加载配置 / Load configuration
    let config = match config::Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ 配置加载失败 / Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // 初始化日志；配置了目录时额外写入按天滚动的文件
    // Initialise logging; a configured directory adds a daily rolling file
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "perps_request_server=debug,tower_http=debug".into());
    let (file_layer, _log_guard) = match &config.logging.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "perps-request-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!("🚀 启动 Perps Request Server / Starting Perps Request Server...");
    tracing::info!("✅ 配置加载成功 / Config loaded");

    // 初始化 RocksDB / Initialise RocksDB
    let db_storage = match db::RocksDbStorage::new(&config) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            tracing::error!("❌ RocksDB 初始化失败 / RocksDB init failed: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("✅ RocksDB 初始化成功 / RocksDB ready");

    // RPC 端点与故障转移 / RPC endpoints with failover
    let endpoints = match EndpointFailoverClient::from_urls(
        &config.solana.rpc_endpoints,
        &config.solana.commitment,
        Duration::from_secs(config.solana.request_timeout_secs),
        Duration::from_millis(config.solana.retry_delay_ms),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("❌ RPC 客户端初始化失败 / RPC client init failed: {}", e);
            std::process::exit(1);
        }
    };
    if endpoints.probe_endpoints().await == 0 {
        tracing::warn!("⚠️ 当前没有可用的 RPC 端点 / No RPC endpoint is reachable right now");
    }

    let prices = match JupiterPriceFeed::new(
        config.price_feed.endpoint.clone(),
        Duration::from_secs(config.price_feed.timeout_secs),
    ) {
        Ok(feed) => Arc::new(feed),
        Err(e) => {
            tracing::error!("❌ 价格源初始化失败 / Price feed init failed: {}", e);
            std::process::exit(1);
        }
    };

    let builder = Arc::new(TransactionBuilder::new(
        BuilderConfig::from_config(&config),
        endpoints,
        prices,
        Arc::new(CounterSequence::new()),
    ));
    let tracker = Arc::new(PositionLifecycleTracker::new(
        TrackerConfig::from_config(&config),
        builder,
        Arc::new(KeypairDirectory::new(&config.wallet.keypair_dir)),
        Arc::new(LogNotifier),
        db_storage.create_tracker_storage(),
    ));
    if tracker.is_paper_mode() {
        tracing::warn!("📝 模拟盘模式：交易只模拟不广播 / Paper mode: trades are simulated, never broadcast");
    }

    // 从存储恢复状态 / Restore state from storage
    if let Err(e) = tracker.restore().await {
        tracing::error!("❌ 状态恢复失败 / State restore failed: {}", e);
        std::process::exit(1);
    }

    // 启动监控循环 / Start the monitor loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = tokio::spawn(run_monitor(
        tracker.clone(),
        Duration::from_secs(config.monitor.interval_secs.max(1)),
        shutdown_rx,
    ));

    // 创建 CORS 层 / CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 创建路由 / Routes
    let api_router = router::create_router(tracker);

    // 创建 Swagger UI
    let swagger_ui = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", docs::ApiDoc::openapi());

    // 组合所有路由 / Combine all routes
    let app = Router::new()
        .merge(swagger_ui)
        .merge(api_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // 绑定地址 / Bind address
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("❌ 绑定地址失败 / Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("✅ 服务器启动成功 / Server started on {}", addr);
    tracing::info!("访问 http://localhost:{}/health 测试接口", config.server.port);
    tracing::info!("访问 http://localhost:{}/swagger-ui 查看 API 文档", config.server.port);

    // 启动服务器，Ctrl+C 时优雅关闭 / Serve until Ctrl+C, then shut down gracefully
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ 监听关闭信号失败 / Failed to listen for shutdown: {}", e);
            }
            tracing::info!("🛑 收到关闭信号 / Shutdown signal received");
        })
        .await;
    if let Err(e) = served {
        tracing::error!("❌ 服务器异常退出 / Server error: {}", e);
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = monitor_handle.await {
        tracing::error!("❌ 监控循环异常退出 / Monitor loop panicked: {}", e);
    }
    tracing::info!("👋 服务器已关闭 / Server stopped");
}

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use chat_backend::{AppState, config::Config, database, router::create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    if !config.mail_enabled() {
        tracing::info!("Mail is not configured, outgoing mail disabled");
    }

    // 设置数据库连接池并初始化表结构
    let pool = database::connect(&config)
        .await
        .expect("Failed to connect to database");
    database::init_db(&pool, &config)
        .await
        .expect("Failed to initialize database");

    let state = AppState {
        pool,
        config: config.clone(),
    };
    let app = create_router(state);

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("{} listening on {}", config.project_name, addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app,
    )
    .await
    .expect("Failed to start server");
}

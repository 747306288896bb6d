//! 主应用程序入口
//!
//! 加载配置，选择存储，启动 Axum Web 服务。

use std::sync::Arc;

use application::{
    Authenticator, BrokerSettings, ChatBroker, Clock, DemoDirectory, InMemoryStore, Repositories,
    SystemClock,
};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig, JwtAuthService};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let repositories = match &config.database.url {
        Some(database_url) => {
            tracing::info!(
                "连接数据库: {}",
                database_url.rsplit('@').next().unwrap_or("unknown")
            );
            let infrastructure = Infrastructure::connect(InfrastructureConfig {
                database_url: database_url.clone(),
                max_connections: config.database.max_connections,
            })
            .await?;
            Repositories::from_store(infrastructure.store)
        }
        None => {
            // 未配置数据库：内存存储 + 演示数据
            let store = Arc::new(InMemoryStore::new());
            match store.seed_demo(&DemoDirectory::standard(), clock.now()).await {
                Some(seed) => tracing::info!(
                    matched_question = %seed.matched_question,
                    pending_question = %seed.pending_question,
                    "使用内存存储，已写入演示数据"
                ),
                None => tracing::warn!("使用内存存储，演示数据不完整"),
            }
            Repositories::from_store(store)
        }
    };

    let jwt = JwtAuthService::new(
        &config.auth.jwt_secret,
        chrono::Duration::hours(config.auth.token_ttl_hours),
    );
    let mut authenticator = Authenticator::new(Arc::new(jwt));
    if config.auth.demo_mode {
        tracing::warn!("演示模式已开启，demo_user 可直接登录");
        authenticator = authenticator.with_demo(DemoDirectory::standard());
    }

    let broker = Arc::new(ChatBroker::new(
        repositories,
        authenticator,
        clock,
        BrokerSettings {
            submit_timeout: config.broker.submit_timeout(),
            history_limit: config.broker.history_limit,
        },
    ));

    let app = router(AppState::new(broker, &config.broker));
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("聊天室服务器启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，停止服务");
}

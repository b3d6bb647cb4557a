use std::net::SocketAddr;
use std::sync::Arc;

use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use callboard::auth::jwt::JwtService;
use callboard::config::AppConfig;
use callboard::db;
use callboard::elevenlabs::ReqwestTransport;
use callboard::routes;
use callboard::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        elevenlabs_configured = config.elevenlabs_api_key.is_some(),
        elevenlabs_base_url = %config.elevenlabs_base_url,
        "loaded callboard configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::run_migrations(&pool)?;
    tracing::info!(applied, "database migrations up to date");

    let transport = Arc::new(ReqwestTransport::new(config.elevenlabs_timeout)?);
    let jwt = JwtService::from_config(&config)?;
    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;

    let state = AppState::new(pool, config, jwt, transport);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("received shutdown signal");
            }
        })
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

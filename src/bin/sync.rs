use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use callboard::{
    auth::jwt::JwtService, config::AppConfig, db, elevenlabs::ReqwestTransport, state::AppState,
    sync::SyncScheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "sync",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        agents = config.sync_agent_ids.len(),
        interval_secs = config.sync_interval.as_secs(),
        "loaded callboard configuration"
    );
    if config.sync_agent_ids.is_empty() {
        tracing::warn!("SYNC_AGENT_IDS is empty, scheduler has nothing to do");
    }
    anyhow::ensure!(
        config.elevenlabs_api_key.is_some(),
        "ELEVENLABS_API_KEY must be set for the sync scheduler"
    );

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let transport = Arc::new(ReqwestTransport::new(config.elevenlabs_timeout)?);
    let jwt = JwtService::from_config(&config)?;

    let state = AppState::new(pool, config, jwt, transport);
    let scheduler = SyncScheduler::from_state(state);

    tokio::select! {
        _ = scheduler.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("sync scheduler received shutdown signal");
        }
    }

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

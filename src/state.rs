use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    cache::{DisabledCache, ResponseCache, TtlCache},
    config::AppConfig,
    db::PgPool,
    elevenlabs::{ElevenLabsClient, HttpTransport},
    error::{AppError, AppResult},
    stats::CustomerStats,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub type StatsCache = Arc<dyn ResponseCache<Vec<CustomerStats>>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub transport: Arc<dyn HttpTransport>,
    pub stats_cache: StatsCache,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        jwt: JwtService,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let stats_cache = stats_cache_for(&config);
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            transport,
            stats_cache,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    /// A client for the configured account, or `MISSING_ENV_VAR` when no API
    /// key is set.
    pub fn elevenlabs(&self) -> AppResult<ElevenLabsClient> {
        let api_key = self
            .config
            .elevenlabs_api_key
            .as_deref()
            .ok_or_else(|| AppError::missing_env("ELEVENLABS_API_KEY"))?;
        let client = ElevenLabsClient::new(
            self.transport.clone(),
            &self.config.elevenlabs_base_url,
            api_key,
            self.config.elevenlabs_retry,
        )?;
        Ok(client)
    }
}

fn stats_cache_for(config: &AppConfig) -> StatsCache {
    if config.stats_cache_ttl.is_zero() {
        Arc::new(DisabledCache)
    } else {
        Arc::new(TtlCache::new(
            config.stats_cache_ttl,
            config.stats_cache_max_entries,
        ))
    }
}

use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod calls;
pub mod diagnostic;
pub mod health;
pub mod params;
pub mod scope;
pub mod stats;
pub mod sync;

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => AllowOrigin::list(parse_origins(origins)),
        None => AllowOrigin::mirror_request(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/api/get-calls", post(calls::list_calls))
        .route("/api/get-call", post(calls::get_call))
        .route("/api/get-customer-stats", post(stats::customer_stats))
        .route("/api/get-call-stats", post(stats::call_stats))
        .route("/api/get_calls_per_day", post(stats::calls_per_day_handler))
        .route(
            "/api/sync-elevenlabs-conversations",
            post(sync::sync_conversations_handler),
        )
        .route(
            "/api/sync-calls-elevenlabs",
            post(sync::sync_conversations_handler),
        )
        .route(
            "/api/sync-elevenlabs-history",
            post(sync::sync_history_handler),
        )
        .route(
            "/api/elevenlabs-diagnostic",
            post(diagnostic::elevenlabs_diagnostic),
        )
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

fn parse_origins(origins: &str) -> Vec<HeaderValue> {
    origins
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter_map(|value| match value.parse::<HeaderValue>() {
            Ok(header) => Some(header),
            Err(_) => {
                warn!(origin = value, "ignoring invalid CORS allowed origin");
                None
            }
        })
        .collect()
}

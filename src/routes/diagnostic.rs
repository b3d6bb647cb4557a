use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    repo::AccessDirectory,
    state::AppState,
};

use super::params::DataResponse;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResponse {
    pub api_key_configured: bool,
    pub base_url: String,
    pub probe: ProbeResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProbeResult {
    fn skipped(message: &str) -> Self {
        Self {
            ok: false,
            chart_count: None,
            error_code: Some("MISSING_ENV_VAR"),
            error_message: Some(message.to_string()),
        }
    }
}

/// Probes the voice API with the configured key. Upstream failures are part
/// of the report, not an error response.
pub async fn elevenlabs_diagnostic(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DataResponse<DiagnosticResponse>>> {
    {
        let mut conn = state.db()?;
        if !conn.is_super_admin(user.user_id)? {
            return Err(AppError::forbidden());
        }
    }

    let api_key_configured = state.config.elevenlabs_api_key.is_some();
    let base_url = state.config.elevenlabs_base_url.clone();

    let probe = match state.elevenlabs() {
        Err(_) => ProbeResult::skipped("ELEVENLABS_API_KEY is not set"),
        Ok(client) => match client.get_dashboard_settings().await {
            Ok(settings) => ProbeResult {
                ok: true,
                chart_count: Some(settings.charts.len()),
                error_code: None,
                error_message: None,
            },
            Err(err) => {
                warn!(error = %err, "voice api diagnostic probe failed");
                ProbeResult {
                    ok: false,
                    chart_count: None,
                    error_code: Some(err.code()),
                    error_message: Some(err.to_string()),
                }
            }
        },
    };
    info!(user_id = %user.user_id, ok = probe.ok, "voice api diagnostic ran");

    Ok(Json(DataResponse::new(DiagnosticResponse {
        api_key_configured,
        base_url,
        probe,
    })))
}

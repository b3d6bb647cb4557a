use axum::{extract::State, http::StatusCode, Json};
use diesel::pg::PgConnection;
use serde::Deserialize;
use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    repo::AgentDirectory,
    resolver::{resolve_agent, AgentResolution},
    state::AppState,
    sync::{sync_conversations, sync_history, ConversationSyncRequest, HistorySyncRequest, SyncRun},
};

use super::params::{parse_timestamp, DataResponse};
use super::scope::agent_access;

const MAX_PAGE_SIZE: u32 = 100;
const MAX_HISTORY_ITEMS: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SyncConversationsRequest {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SyncHistoryRequest {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub voice_id: Option<String>,
    pub page_size: Option<u32>,
    pub max_items: Option<usize>,
}

type SyncResponse = (StatusCode, Json<DataResponse<SyncRun>>);

pub async fn sync_conversations_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<SyncConversationsRequest>,
) -> AppResult<SyncResponse> {
    let agent_id = authorize(&state, &user, &payload.agent_id)?;
    let page_size = check_page_size(payload.page_size)?;
    if payload.max_pages == Some(0) {
        return Err(AppError::invalid_field("maxPages", "maxPages must be at least 1"));
    }
    let from = payload
        .from_date
        .as_deref()
        .map(|value| parse_timestamp("fromDate", value))
        .transpose()?
        .map(|value| value.and_utc());
    let to = payload
        .to_date
        .as_deref()
        .map(|value| parse_timestamp("toDate", value))
        .transpose()?
        .map(|value| value.and_utc());
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::invalid_field(
                "fromDate",
                "fromDate must not be after toDate",
            ));
        }
    }

    info!(user_id = %user.user_id, agent_id = %agent_id, "conversation sync requested");
    let run = sync_conversations(
        &state,
        ConversationSyncRequest {
            agent_id,
            agent_name: clean(payload.agent_name),
            from,
            to,
            page_size,
            max_pages: payload.max_pages,
        },
    )
    .await?;

    Ok(respond(run))
}

pub async fn sync_history_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<SyncHistoryRequest>,
) -> AppResult<SyncResponse> {
    let agent_id = authorize(&state, &user, &payload.agent_id)?;
    let page_size = check_page_size(payload.page_size)?;
    if let Some(max_items) = payload.max_items {
        if !(1..=MAX_HISTORY_ITEMS).contains(&max_items) {
            return Err(AppError::invalid_field(
                "maxItems",
                format!("maxItems must be between 1 and {MAX_HISTORY_ITEMS}"),
            ));
        }
    }

    info!(user_id = %user.user_id, agent_id = %agent_id, "history sync requested");
    let run = sync_history(
        &state,
        HistorySyncRequest {
            agent_id,
            agent_name: clean(payload.agent_name),
            voice_id: clean(payload.voice_id),
            page_size,
            max_items: payload.max_items,
        },
    )
    .await?;

    Ok(respond(run))
}

/// Returns the upstream agent id to sync once the caller may sync it. Known
/// agents are synced by their external id, whatever reference was given.
fn authorize(state: &AppState, user: &AuthenticatedUser, agent_ref: &str) -> AppResult<String> {
    let agent_ref = agent_ref.trim();
    if agent_ref.is_empty() {
        return Err(AppError::invalid_field("agentId", "agentId must not be empty"));
    }

    let mut pooled = state.db()?;
    let conn: &mut PgConnection = &mut pooled;
    let resolution = resolve_agent(conn, agent_ref)?;
    if !agent_access(conn, user.user_id, agent_ref, resolution.agent_id())? {
        return Err(AppError::forbidden());
    }

    let AgentResolution::Found(id) = resolution else {
        return Ok(agent_ref.to_string());
    };
    conn.agent_by_id(id)?
        .and_then(|agent| agent.external_id)
        .map(|external_id| external_id.trim().to_string())
        .filter(|external_id| !external_id.is_empty())
        .ok_or_else(|| AppError::invalid_field("agentId", "agent has no external id to sync"))
}

fn check_page_size(page_size: Option<u32>) -> AppResult<Option<u32>> {
    match page_size {
        Some(size) if !(1..=MAX_PAGE_SIZE).contains(&size) => Err(AppError::invalid_field(
            "pageSize",
            format!("pageSize must be between 1 and {MAX_PAGE_SIZE}"),
        )),
        other => Ok(other),
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn respond(run: SyncRun) -> SyncResponse {
    let status = if run.is_partial() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };
    (status, Json(DataResponse::new(run)))
}

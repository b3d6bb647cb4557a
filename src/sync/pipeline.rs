use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use serde::Serialize;
use tokio::task;
use tracing::{info, warn};

use crate::elevenlabs::{
    ConversationQuery, ConversationSummary, ElevenLabsClient, DEFAULT_PAGE_SIZE,
};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::orchestrator::{sync_calls, ExternalCall, SyncOptions, SyncReport};
use super::status::{
    load_sync_status, record_sync_status, status_key, SyncState, CONVERSATIONS_PROVIDER,
    HISTORY_PROVIDER,
};

pub const DEFAULT_HISTORY_ITEMS: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ConversationSyncRequest {
    pub agent_id: String,
    pub agent_name: Option<String>,
    /// Defaults to the agent's stored watermark. Runs with an explicit
    /// window leave the watermark untouched.
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct HistorySyncRequest {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub voice_id: Option<String>,
    pub page_size: Option<u32>,
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub provider: &'static str,
    pub status: SyncState,
    pub fetched: usize,
    pub detail_failures: usize,
    #[serde(flatten)]
    pub report: SyncReport,
}

impl SyncRun {
    /// At least one item failed.
    pub fn is_partial(&self) -> bool {
        self.report.summary.error > 0
    }
}

/// Pulls conversations for one agent and upserts them as calls.
pub async fn sync_conversations(
    state: &AppState,
    request: ConversationSyncRequest,
) -> AppResult<SyncRun> {
    let client = state.elevenlabs()?;
    let started_at = Utc::now().naive_utc();
    let key = status_key(CONVERSATIONS_PROVIDER, &request.agent_id);
    let watermark = begin_run(state, &key).await?;
    let next_watermark = (request.from.is_none() && request.to.is_none()).then_some(started_at);

    let from = request
        .from
        .map(|from| from.timestamp())
        .or_else(|| watermark.map(|mark| mark.and_utc().timestamp()));
    let query = ConversationQuery {
        agent_id: Some(request.agent_id.clone()),
        from_unix: from,
        to_unix: request.to.map(|to| to.timestamp()),
        page_size: request.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let max_pages = request.max_pages.unwrap_or(state.config.sync_max_pages);

    let summaries = match client.list_all_conversations(&query, max_pages).await {
        Ok(summaries) => summaries,
        Err(err) => {
            fail_run(state, &key).await;
            return Err(err.into());
        }
    };

    let (items, detail_failures) = fetch_details(&client, &summaries).await;
    let options = SyncOptions {
        customer_match_strategy: state.config.customer_match_strategy,
        agent_name: request.agent_name,
    };
    finish_run(
        state,
        CONVERSATIONS_PROVIDER,
        next_watermark,
        items,
        request.agent_id,
        options,
        detail_failures,
    )
    .await
}

/// Pulls legacy text-to-speech history items and upserts them as calls.
pub async fn sync_history(state: &AppState, request: HistorySyncRequest) -> AppResult<SyncRun> {
    let client = state.elevenlabs()?;
    let started_at = Utc::now().naive_utc();
    let key = status_key(HISTORY_PROVIDER, &request.agent_id);
    begin_run(state, &key).await?;

    let history = match client
        .get_history(
            request.voice_id.as_deref(),
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            request.max_items.unwrap_or(DEFAULT_HISTORY_ITEMS),
        )
        .await
    {
        Ok(history) => history,
        Err(err) => {
            fail_run(state, &key).await;
            return Err(err.into());
        }
    };

    let items = history
        .iter()
        .map(|item| {
            let audio_url = client.history_audio_url(&item.history_item_id);
            ExternalCall::from_history(item, Some(audio_url))
        })
        .collect();
    let options = SyncOptions {
        customer_match_strategy: state.config.customer_match_strategy,
        agent_name: request.agent_name,
    };
    finish_run(
        state,
        HISTORY_PROVIDER,
        Some(started_at),
        items,
        request.agent_id,
        options,
        0,
    )
    .await
}

/// A failed detail fetch degrades that item to its summary fields.
async fn fetch_details(
    client: &ElevenLabsClient,
    summaries: &[ConversationSummary],
) -> (Vec<ExternalCall>, usize) {
    let mut items = Vec::with_capacity(summaries.len());
    let mut failures = 0;
    for summary in summaries {
        let audio_url = Some(client.conversation_audio_url(&summary.conversation_id));
        match client.get_conversation(&summary.conversation_id).await {
            Ok(detail) => items.push(ExternalCall::from_conversation(
                summary,
                Some(&detail),
                audio_url,
            )),
            Err(err) => {
                failures += 1;
                warn!(
                    conversation_id = %summary.conversation_id,
                    error = %err,
                    "conversation detail unavailable, syncing summary only"
                );
                items.push(ExternalCall::from_conversation(summary, None, audio_url));
            }
        }
    }
    (items, failures)
}

async fn with_conn<F, T>(state: &AppState, work: F) -> AppResult<T>
where
    F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    task::spawn_blocking(move || {
        let mut conn = state.db()?;
        work(&mut *conn)
    })
    .await
    .map_err(AppError::internal)?
}

/// Marks the status row in progress and returns its watermark.
async fn begin_run(state: &AppState, key: &str) -> AppResult<Option<NaiveDateTime>> {
    let key = key.to_string();
    with_conn(state, move |conn| {
        let previous = load_sync_status(conn, &key)?;
        record_sync_status(conn, &key, SyncState::InProgress, None)?;
        Ok(previous.and_then(|row| row.last_sync_date))
    })
    .await
}

async fn fail_run(state: &AppState, key: &str) {
    let owned = key.to_string();
    if let Err(err) = with_conn(state, move |conn| {
        record_sync_status(conn, &owned, SyncState::Error, None).map_err(AppError::from)
    })
    .await
    {
        warn!(key, error = %err, "failed to record sync failure");
    }
}

/// `watermark` is stored only when the run did not end in error.
async fn finish_run(
    state: &AppState,
    provider: &'static str,
    watermark: Option<NaiveDateTime>,
    items: Vec<ExternalCall>,
    agent_id: String,
    options: SyncOptions,
    detail_failures: usize,
) -> AppResult<SyncRun> {
    let fetched = items.len();
    let key = status_key(provider, &agent_id);
    let status_row = key.clone();
    let outcome = with_conn(state, move |conn| {
        let report = sync_calls(conn, &items, &agent_id, &options)?;
        let status = SyncState::from_counts(report.summary.success, report.summary.error);
        let watermark = watermark.filter(|_| status != SyncState::Error);
        record_sync_status(conn, &status_row, status, watermark)?;
        Ok((status, report))
    })
    .await;

    let (status, report) = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            fail_run(state, &key).await;
            return Err(err);
        }
    };
    state.stats_cache.invalidate_all();

    info!(
        provider,
        agent_id = %report.agent_id,
        status = status.as_str(),
        fetched,
        detail_failures,
        "sync run finished"
    );

    Ok(SyncRun {
        provider,
        status,
        fetched,
        detail_failures,
        report,
    })
}

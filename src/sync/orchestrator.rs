use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CustomerMatchStrategy;
use crate::elevenlabs::{render_transcript, ConversationDetail, ConversationSummary, HistoryItem};
use crate::models::{NewAgent, NewCall, NewCustomer};
use crate::repo::SyncStore;
use crate::resolver::{resolve_agent, AgentResolution};

pub const PROVIDER: &str = "elevenlabs";
pub const UNKNOWN_CALLER: &str = "Unknown caller";
const MAX_SATISFACTION: f64 = 5.0;

/// A call as reported by the voice platform, before it is bound to local
/// agent and customer rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCall {
    pub external_id: String,
    pub customer_name: String,
    pub started_at: NaiveDateTime,
    pub duration_secs: i64,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub satisfaction_score: Option<f64>,
    pub tags: Vec<String>,
}

impl ExternalCall {
    /// Prefers the detail payload where both carry a value.
    pub fn from_conversation(
        summary: &ConversationSummary,
        detail: Option<&ConversationDetail>,
        audio_url: Option<String>,
    ) -> Self {
        let metadata = detail.map(|detail| &detail.metadata);
        let analysis = detail.and_then(|detail| detail.analysis.as_ref());

        let started_at = metadata
            .and_then(|meta| meta.start_time_unix_secs)
            .unwrap_or(summary.start_time_unix_secs);
        let duration_secs = metadata
            .and_then(|meta| meta.call_duration_secs)
            .unwrap_or(summary.call_duration_secs);
        let customer_name = metadata
            .and_then(|meta| meta.phone_call.as_ref())
            .and_then(|phone| phone.external_number.as_deref())
            .map(str::trim)
            .filter(|number| !number.is_empty())
            .unwrap_or(UNKNOWN_CALLER)
            .to_string();
        let outcome = analysis
            .and_then(|analysis| analysis.call_successful.clone())
            .or_else(|| summary.call_successful.clone());

        let mut tags = vec![PROVIDER.to_string(), "conversation".to_string()];
        tags.extend(outcome.filter(|value| !value.is_empty()));

        Self {
            external_id: summary.conversation_id.clone(),
            customer_name,
            started_at: from_unix(started_at),
            duration_secs,
            audio_url,
            transcript: detail.and_then(|detail| render_transcript(&detail.transcript)),
            summary: analysis
                .and_then(|analysis| analysis.transcript_summary.clone())
                .filter(|text| !text.trim().is_empty()),
            satisfaction_score: None,
            tags,
        }
    }

    /// History items carry no call length, so duration is 0.
    pub fn from_history(item: &HistoryItem, audio_url: Option<String>) -> Self {
        let customer_name = item
            .voice_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_CALLER)
            .to_string();
        let mut tags = vec![PROVIDER.to_string(), "history".to_string()];
        tags.extend(item.state.clone().filter(|state| !state.is_empty()));

        Self {
            external_id: item.history_item_id.clone(),
            customer_name,
            started_at: from_unix(item.date_unix),
            duration_secs: 0,
            audio_url,
            transcript: item.text.clone().filter(|text| !text.trim().is_empty()),
            summary: None,
            satisfaction_score: None,
            tags,
        }
    }
}

fn from_unix(secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(secs, 0)
        .map(|moment| moment.naive_utc())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub customer_match_strategy: CustomerMatchStrategy,
    /// Display name for an agent created by this run.
    pub agent_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncItemResult {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SyncAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub success: usize,
    pub error: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub agent_id: Uuid,
    pub agent_created: bool,
    pub results: Vec<SyncItemResult>,
    pub summary: SyncSummary,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("agent id must not be empty")]
    MissingAgentId,
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Error)]
enum ItemError {
    #[error("{0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Binds `items` to the agent behind `agent_external_id` and upserts them one
/// at a time. A failing item is recorded and the batch moves on; only agent
/// resolution failures abort the run.
pub fn sync_calls<S>(
    store: &mut S,
    items: &[ExternalCall],
    agent_external_id: &str,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: SyncStore + ?Sized,
{
    let (agent_id, agent_created) = ensure_agent(store, agent_external_id, options)?;

    let mut results = Vec::with_capacity(items.len());
    let mut summary = SyncSummary {
        total: items.len(),
        ..SyncSummary::default()
    };

    for item in items {
        let id = item.external_id.trim().to_string();
        match sync_item(store, agent_id, &id, item, options.customer_match_strategy) {
            Ok(action) => {
                summary.success += 1;
                results.push(SyncItemResult {
                    id,
                    success: true,
                    action: Some(action),
                    error: None,
                });
            }
            Err(err) => {
                warn!(call_id = %id, error = %err, "failed to sync call");
                summary.error += 1;
                results.push(SyncItemResult {
                    id,
                    success: false,
                    action: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    info!(
        %agent_id,
        total = summary.total,
        success = summary.success,
        error = summary.error,
        "call sync finished"
    );

    Ok(SyncReport {
        agent_id,
        agent_created,
        results,
        summary,
    })
}

fn ensure_agent<S>(
    store: &mut S,
    agent_external_id: &str,
    options: &SyncOptions,
) -> Result<(Uuid, bool), SyncError>
where
    S: SyncStore + ?Sized,
{
    let external_id = agent_external_id.trim();
    if external_id.is_empty() {
        return Err(SyncError::MissingAgentId);
    }

    match resolve_agent(store, external_id)? {
        AgentResolution::Found(id) => Ok((id, false)),
        AgentResolution::FoundNoFilter | AgentResolution::NotFound => {
            let name = options
                .agent_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(external_id)
                .to_string();
            let agent = store.create_agent(NewAgent {
                id: Uuid::new_v4(),
                name,
                external_id: Some(external_id.to_string()),
                provider: Some(PROVIDER.to_string()),
                role: "assistant".to_string(),
                status: Some("active".to_string()),
            })?;
            info!(agent_id = %agent.id, external_id, "created agent for sync");
            Ok((agent.id, true))
        }
    }
}

fn sync_item<S>(
    store: &mut S,
    agent_id: Uuid,
    id: &str,
    item: &ExternalCall,
    strategy: CustomerMatchStrategy,
) -> Result<SyncAction, ItemError>
where
    S: SyncStore + ?Sized,
{
    if id.is_empty() {
        return Err(ItemError::Invalid("call id must not be empty".into()));
    }
    if let Some(score) = item.satisfaction_score {
        if !(0.0..=MAX_SATISFACTION).contains(&score) {
            return Err(ItemError::Invalid(format!(
                "satisfaction score {score} is outside 0..=5"
            )));
        }
    }
    let duration = i32::try_from(item.duration_secs)
        .ok()
        .filter(|secs| *secs >= 0)
        .ok_or_else(|| {
            ItemError::Invalid(format!("duration {} is out of range", item.duration_secs))
        })?;

    let (agent_id, customer_id, action) = match store.find_call(id)? {
        Some(existing) => (existing.agent_id, existing.customer_id, SyncAction::Updated),
        None => {
            let customer_id = ensure_customer(store, &item.customer_name, strategy)?;
            (agent_id, customer_id, SyncAction::Created)
        }
    };

    store.upsert_call(&NewCall {
        id: id.to_string(),
        agent_id,
        customer_id,
        date: item.started_at,
        duration,
        audio_url: item.audio_url.clone(),
        transcript: item.transcript.clone(),
        summary: item.summary.clone(),
        satisfaction_score: item.satisfaction_score,
        tags: serde_json::Value::from(item.tags.clone()),
    })?;

    Ok(action)
}

fn ensure_customer<S>(
    store: &mut S,
    name: &str,
    strategy: CustomerMatchStrategy,
) -> Result<Uuid, ItemError>
where
    S: SyncStore + ?Sized,
{
    let name = match name.trim() {
        "" => UNKNOWN_CALLER,
        trimmed => trimmed,
    };
    if let Some(customer) = store.find_customer(name, strategy)? {
        return Ok(customer.id);
    }
    let customer = store.create_customer(NewCustomer {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: None,
        phone: None,
        company: None,
    })?;
    Ok(customer.id)
}

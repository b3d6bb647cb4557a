use std::collections::HashMap;

use axum::{extract::State, Json};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    elevenlabs::render_transcript,
    error::{AppError, AppResult},
    extract::ApiJson,
    models::{Call, Customer},
    repo::escape_like,
    schema::{calls, customers},
    state::AppState,
};

use super::params::{parse_timestamp, to_iso, DataResponse};
use super::scope::{
    agent_access, default_scope, scope_for_agent, scope_for_organization, CallScope,
};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ListCallsRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub org_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GetCallRequest {
    pub call_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortColumn {
    Date,
    Duration,
    SatisfactionScore,
    CreatedAt,
}

#[derive(Debug)]
struct CallFilters {
    search: Option<String>,
    customer_id: Option<Uuid>,
    start: Option<chrono::NaiveDateTime>,
    end: Option<chrono::NaiveDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub id: String,
    pub agent_id: Uuid,
    pub customer_id: Uuid,
    pub customer_name: Option<String>,
    pub date: String,
    pub duration: i32,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub satisfaction_score: Option<f64>,
    pub tags: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct CallListResponse {
    pub calls: Vec<CallResponse>,
    pub count: i64,
}

impl CallListResponse {
    fn empty() -> Self {
        Self {
            calls: Vec::new(),
            count: 0,
        }
    }
}

pub async fn list_calls(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<ListCallsRequest>,
) -> AppResult<Json<DataResponse<CallListResponse>>> {
    let limit = payload.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::invalid_field(
            "limit",
            format!("limit must be between 1 and {MAX_LIMIT}"),
        ));
    }
    let offset = payload.offset.unwrap_or(0);
    if offset < 0 {
        return Err(AppError::invalid_field("offset", "offset must not be negative"));
    }
    let sort = parse_sort(payload.sort.as_deref())?;
    let descending = parse_order(payload.order.as_deref())?;
    let filters = CallFilters {
        search: payload
            .search
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| format!("%{}%", escape_like(value))),
        customer_id: payload.customer_id,
        start: payload
            .start_date
            .as_deref()
            .map(|value| parse_timestamp("startDate", value))
            .transpose()?,
        end: payload
            .end_date
            .as_deref()
            .map(|value| parse_timestamp("endDate", value))
            .transpose()?,
    };

    let mut conn = state.db()?;
    let agent_ref = payload.agent_id.as_deref();
    let scope = match (payload.org_id, agent_ref) {
        (Some(org_id), agent_ref) => {
            scope_for_organization(&mut conn, user.user_id, org_id, agent_ref)?
        }
        (None, Some(agent_ref)) => scope_for_agent(&mut conn, user.user_id, agent_ref)?,
        (None, None) => default_scope(&mut conn, user.user_id)?,
    };
    if scope.is_empty() {
        debug!(user_id = %user.user_id, "call list scope is empty");
        return Ok(Json(DataResponse::new(CallListResponse::empty())));
    }

    let count: i64 = filtered(&scope, &filters).count().get_result(&mut conn)?;
    let query = filtered(&scope, &filters);
    let query = match (sort, descending) {
        (SortColumn::Date, true) => query.order(calls::date.desc()),
        (SortColumn::Date, false) => query.order(calls::date.asc()),
        (SortColumn::Duration, true) => query.order(calls::duration.desc()),
        (SortColumn::Duration, false) => query.order(calls::duration.asc()),
        (SortColumn::SatisfactionScore, true) => {
            query.order(calls::satisfaction_score.desc().nulls_last())
        }
        (SortColumn::SatisfactionScore, false) => {
            query.order(calls::satisfaction_score.asc().nulls_last())
        }
        (SortColumn::CreatedAt, true) => query.order(calls::created_at.desc()),
        (SortColumn::CreatedAt, false) => query.order(calls::created_at.asc()),
    };
    let rows: Vec<Call> = query
        .then_order_by(calls::id.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    let names = customer_names(&mut conn, &rows)?;
    let calls = rows
        .into_iter()
        .map(|call| {
            let name = names.get(&call.customer_id).cloned();
            to_call_response(call, name)
        })
        .collect();

    Ok(Json(DataResponse::new(CallListResponse { calls, count })))
}

pub async fn get_call(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<GetCallRequest>,
) -> AppResult<Json<DataResponse<CallResponse>>> {
    let call_id = payload.call_id.trim().to_string();
    if call_id.is_empty() {
        return Err(AppError::invalid_field("callId", "callId must not be empty"));
    }

    let (mut call, customer) = {
        let mut conn = state.db()?;
        let call: Call = calls::table
            .find(&call_id)
            .first(&mut conn)
            .optional()?
            .ok_or_else(AppError::not_found)?;

        let visible = default_scope(&mut conn, user.user_id)?.allows(call.agent_id)
            || agent_access(
                &mut conn,
                user.user_id,
                &call.agent_id.to_string(),
                Some(call.agent_id),
            )?;
        if !visible {
            // Hidden calls are indistinguishable from missing ones.
            return Err(AppError::not_found());
        }

        let customer: Option<Customer> = customers::table
            .find(call.customer_id)
            .first(&mut conn)
            .optional()?;
        (call, customer)
    };

    // The pooled connection is released while the voice API is called.
    if call.transcript.is_none() {
        if let Some(transcript) = fetch_transcript(&state, &call.id).await {
            let mut conn = state.db()?;
            diesel::update(calls::table.find(&call.id))
                .set(calls::transcript.eq(Some(&transcript)))
                .execute(&mut conn)?;
            call.transcript = Some(transcript);
        }
    }

    Ok(Json(DataResponse::new(to_call_response(
        call,
        customer.map(|customer| customer.name),
    ))))
}

/// Best-effort: a missing key or a failing upstream leaves the call as is.
async fn fetch_transcript(state: &AppState, call_id: &str) -> Option<String> {
    let client = state.elevenlabs().ok()?;
    match client.get_conversation_transcript(call_id).await {
        Ok(turns) => render_transcript(&turns),
        Err(err) => {
            warn!(call_id, error = %err, "live transcript fetch failed");
            None
        }
    }
}

fn filtered<'a>(scope: &'a CallScope, filters: &'a CallFilters) -> calls::BoxedQuery<'a, Pg> {
    let mut query = calls::table.into_boxed();

    if let CallScope::Agents(ids) = scope {
        query = query.filter(calls::agent_id.eq_any(ids.clone()));
    }
    if let Some(customer_id) = filters.customer_id {
        query = query.filter(calls::customer_id.eq(customer_id));
    }
    if let Some(start) = filters.start {
        query = query.filter(calls::date.ge(start));
    }
    if let Some(end) = filters.end {
        query = query.filter(calls::date.le(end));
    }
    if let Some(pattern) = filters.search.as_ref() {
        let matching_customers = customers::table
            .filter(customers::name.ilike(pattern))
            .select(customers::id);
        query = query.filter(
            calls::summary
                .ilike(pattern)
                .or(calls::transcript.ilike(pattern))
                .or(calls::customer_id.eq_any(matching_customers).nullable()),
        );
    }
    query
}

fn parse_sort(value: Option<&str>) -> AppResult<SortColumn> {
    match value.map(str::trim).unwrap_or("date") {
        "date" => Ok(SortColumn::Date),
        "duration" => Ok(SortColumn::Duration),
        "satisfaction_score" => Ok(SortColumn::SatisfactionScore),
        "created_at" => Ok(SortColumn::CreatedAt),
        other => Err(AppError::invalid_field(
            "sort",
            format!(
                "sort must be one of date, duration, satisfaction_score, created_at (got '{other}')"
            ),
        )),
    }
}

/// `true` for descending, the default.
fn parse_order(value: Option<&str>) -> AppResult<bool> {
    match value.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        None | Some("desc") => Ok(true),
        Some("asc") => Ok(false),
        Some(_) => Err(AppError::invalid_field("order", "order must be asc or desc")),
    }
}

pub(crate) fn customer_names(
    conn: &mut PgConnection,
    rows: &[Call],
) -> QueryResult<HashMap<Uuid, String>> {
    let mut ids: Vec<Uuid> = rows.iter().map(|call| call.customer_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let pairs: Vec<(Uuid, String)> = customers::table
        .filter(customers::id.eq_any(ids))
        .select((customers::id, customers::name))
        .load(conn)?;
    Ok(pairs.into_iter().collect())
}

fn to_call_response(call: Call, customer_name: Option<String>) -> CallResponse {
    CallResponse {
        id: call.id,
        agent_id: call.agent_id,
        customer_id: call.customer_id,
        customer_name,
        date: to_iso(call.date),
        duration: call.duration,
        audio_url: call.audio_url,
        transcript: call.transcript,
        summary: call.summary,
        satisfaction_score: call.satisfaction_score,
        tags: call.tags,
    }
}

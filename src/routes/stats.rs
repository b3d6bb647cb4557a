use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    extract::ApiJson,
    models::{Call, Customer},
    schema::{calls, customers},
    state::AppState,
    stats::{
        aggregate_customer_stats, calls_per_day, calls_per_day_between, summarize_calls,
        top_customers, CustomerStats,
    },
};

use super::params::{parse_date, DataResponse};
use super::scope::{scope_for_agent, CallScope};

const DEFAULT_WINDOW_DAYS: u32 = 30;
const MAX_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AgentStatsRequest {
    pub agent_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CallsPerDayRequest {
    pub agent_id: String,
    pub days: Option<u32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatsResponse {
    pub total_calls: i64,
    pub total_duration: i64,
    pub avg_duration: f64,
    pub avg_satisfaction: Option<f64>,
    pub rated_calls: i64,
    pub top_customers: Vec<CustomerStats>,
}

#[derive(Debug, Serialize)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsPerDayResponse {
    pub calls_per_day: BTreeMap<String, i64>,
    pub time_range: TimeRange,
    pub total: i64,
}

pub async fn customer_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<AgentStatsRequest>,
) -> AppResult<Json<DataResponse<Vec<CustomerStats>>>> {
    let mut conn = state.db()?;
    let scope = scope_for_agent(&mut conn, user.user_id, &payload.agent_id)?;
    if scope.is_empty() {
        return Ok(Json(DataResponse::new(Vec::new())));
    }

    let cache_key = payload.agent_id.trim().to_string();
    if let Some(cached) = state.stats_cache.get(&cache_key) {
        debug!(agent_ref = %cache_key, "customer stats served from cache");
        return Ok(Json(DataResponse::new(cached)));
    }

    let rows = load_calls(&mut conn, &scope, None)?;
    let customers = load_customers(&mut conn, &rows)?;
    let stats = aggregate_customer_stats(&customers, &rows);
    state.stats_cache.insert(cache_key, stats.clone());

    Ok(Json(DataResponse::new(stats)))
}

pub async fn call_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<AgentStatsRequest>,
) -> AppResult<Json<DataResponse<CallStatsResponse>>> {
    let mut conn = state.db()?;
    let scope = scope_for_agent(&mut conn, user.user_id, &payload.agent_id)?;
    let rows = if scope.is_empty() {
        Vec::new()
    } else {
        load_calls(&mut conn, &scope, None)?
    };
    let customers = load_customers(&mut conn, &rows)?;

    let summary = summarize_calls(&rows);
    Ok(Json(DataResponse::new(CallStatsResponse {
        total_calls: summary.total_calls,
        total_duration: summary.total_duration,
        avg_duration: summary.avg_duration,
        avg_satisfaction: summary.avg_satisfaction,
        rated_calls: summary.rated_calls,
        top_customers: top_customers(&customers, &rows),
    })))
}

pub async fn calls_per_day_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<CallsPerDayRequest>,
) -> AppResult<Json<DataResponse<CallsPerDayResponse>>> {
    let today = Utc::now().date_naive();
    let (start, end) = window(&payload, today)?;

    let mut conn = state.db()?;
    let scope = scope_for_agent(&mut conn, user.user_id, &payload.agent_id)?;
    let rows = if scope.is_empty() {
        Vec::new()
    } else {
        load_calls(&mut conn, &scope, Some((start, end)))?
    };

    let per_day = match (&payload.start_date, &payload.end_date) {
        (Some(_), Some(_)) => calls_per_day_between(&rows, start, end),
        _ => calls_per_day(&rows, payload.days.unwrap_or(DEFAULT_WINDOW_DAYS), today),
    };
    let total = per_day.values().sum();

    Ok(Json(DataResponse::new(CallsPerDayResponse {
        calls_per_day: per_day
            .into_iter()
            .map(|(day, count)| (day.format("%Y-%m-%d").to_string(), count))
            .collect(),
        time_range: TimeRange { start, end },
        total,
    })))
}

fn window(payload: &CallsPerDayRequest, today: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
    match (&payload.start_date, &payload.end_date) {
        (Some(start), Some(end)) => {
            if payload.days.is_some() {
                return Err(AppError::invalid_field(
                    "days",
                    "days cannot be combined with startDate and endDate",
                ));
            }
            let start = parse_date("startDate", start)?;
            let end = parse_date("endDate", end)?;
            if start > end {
                return Err(AppError::invalid_field(
                    "startDate",
                    "startDate must not be after endDate",
                ));
            }
            if (end - start).num_days() >= i64::from(MAX_WINDOW_DAYS) {
                return Err(AppError::bad_request(format!(
                    "date range must not exceed {MAX_WINDOW_DAYS} days"
                )));
            }
            Ok((start, end))
        }
        (None, None) => {
            let days = payload.days.unwrap_or(DEFAULT_WINDOW_DAYS);
            if !(1..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(AppError::invalid_field(
                    "days",
                    format!("days must be between 1 and {MAX_WINDOW_DAYS}"),
                ));
            }
            let start = today
                .checked_sub_days(Days::new(u64::from(days - 1)))
                .ok_or_else(|| AppError::bad_request("days reaches before the calendar start"))?;
            Ok((start, today))
        }
        _ => Err(AppError::bad_request(
            "startDate and endDate must be given together",
        )),
    }
}

fn load_calls(
    conn: &mut PgConnection,
    scope: &CallScope,
    range: Option<(NaiveDate, NaiveDate)>,
) -> QueryResult<Vec<Call>> {
    let mut query = calls::table.into_boxed();
    match scope {
        CallScope::Agents(ids) => query = query.filter(calls::agent_id.eq_any(ids.clone())),
        CallScope::Everything => {}
        CallScope::Nothing => return Ok(Vec::new()),
    }
    if let Some((start, end)) = range {
        let from = start.and_time(NaiveTime::MIN);
        let until = end
            .succ_opt()
            .map(|next| next.and_time(NaiveTime::MIN))
            .unwrap_or(end.and_time(NaiveTime::MIN));
        query = query.filter(calls::date.ge(from)).filter(calls::date.lt(until));
    }
    query.order(calls::date.asc()).load(conn)
}

fn load_customers(conn: &mut PgConnection, rows: &[Call]) -> QueryResult<Vec<Customer>> {
    let mut ids: Vec<_> = rows.iter().map(|call| call.customer_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    customers::table
        .filter(customers::id.eq_any(ids))
        .order((customers::name.asc(), customers::id.asc()))
        .load(conn)
}

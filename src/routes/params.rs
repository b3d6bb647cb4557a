use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Success envelope shared by the analytics handlers.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date
/// stands for the start of that day (UTC).
pub fn parse_timestamp(field: &str, value: &str) -> AppResult<NaiveDateTime> {
    let value = value.trim();
    if let Ok(moment) = DateTime::parse_from_rfc3339(value) {
        return Ok(moment.with_timezone(&Utc).naive_utc());
    }
    parse_date(field, value).map(|date| date.and_time(NaiveTime::MIN))
}

pub fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|moment| moment.with_timezone(&Utc).date_naive())
        .map_err(|_| {
            AppError::invalid_field(
                field,
                format!("{field} must be an RFC 3339 timestamp or a YYYY-MM-DD date"),
            )
        })
}

pub fn to_iso(value: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc).to_rfc3339()
}

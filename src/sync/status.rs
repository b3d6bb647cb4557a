use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;

use crate::models::{NewSyncStatus, SyncStatusChangeset, SyncStatusRow};
use crate::schema::sync_status;

pub const CONVERSATIONS_PROVIDER: &str = "elevenlabs_conversations";
pub const HISTORY_PROVIDER: &str = "elevenlabs_history";

/// Status rows are kept per provider and upstream agent, since every listing
/// is filtered by agent.
pub fn status_key(provider: &str, agent_id: &str) -> String {
    format!("{provider}:{}", agent_id.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    InProgress,
    Success,
    PartialSuccess,
    Error,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::InProgress => "in_progress",
            SyncState::Success => "success",
            SyncState::PartialSuccess => "partial_success",
            SyncState::Error => "error",
        }
    }

    /// Runs where nothing failed are a success, even when there was nothing
    /// to sync. Every item failing is an error.
    pub fn from_counts(success: usize, error: usize) -> Self {
        match (success, error) {
            (_, 0) => SyncState::Success,
            (0, _) => SyncState::Error,
            _ => SyncState::PartialSuccess,
        }
    }
}

pub fn load_sync_status(conn: &mut PgConnection, key: &str) -> QueryResult<Option<SyncStatusRow>> {
    sync_status::table
        .find(key)
        .first(conn)
        .optional()
}

/// Upserts the status row for `key`. `last_sync_date = None` keeps the stored
/// watermark.
pub fn record_sync_status(
    conn: &mut PgConnection,
    key: &str,
    state: SyncState,
    last_sync_date: Option<NaiveDateTime>,
) -> QueryResult<()> {
    let now = Utc::now().naive_utc();
    diesel::insert_into(sync_status::table)
        .values(&NewSyncStatus {
            provider: key,
            status: state.as_str(),
            last_sync_date,
            updated_at: now,
        })
        .on_conflict(sync_status::provider)
        .do_update()
        .set(&SyncStatusChangeset {
            status: state.as_str(),
            last_sync_date,
            updated_at: now,
        })
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_keys_are_per_agent() {
        assert_eq!(
            status_key(CONVERSATIONS_PROVIDER, " agent_a "),
            "elevenlabs_conversations:agent_a"
        );
        assert_ne!(
            status_key(CONVERSATIONS_PROVIDER, "agent_a"),
            status_key(CONVERSATIONS_PROVIDER, "agent_b")
        );
        assert_ne!(
            status_key(CONVERSATIONS_PROVIDER, "agent_a"),
            status_key(HISTORY_PROVIDER, "agent_a")
        );
    }

    #[test]
    fn outcome_follows_item_counts() {
        assert_eq!(SyncState::from_counts(0, 0), SyncState::Success);
        assert_eq!(SyncState::from_counts(3, 0), SyncState::Success);
        assert_eq!(SyncState::from_counts(2, 1), SyncState::PartialSuccess);
        assert_eq!(SyncState::from_counts(0, 4), SyncState::Error);
    }

    #[test]
    fn states_serialize_as_stored() {
        for state in [
            SyncState::Pending,
            SyncState::InProgress,
            SyncState::Success,
            SyncState::PartialSuccess,
            SyncState::Error,
        ] {
            assert_eq!(
                serde_json::to_value(state).expect("serialize"),
                serde_json::Value::String(state.as_str().to_string())
            );
        }
    }
}

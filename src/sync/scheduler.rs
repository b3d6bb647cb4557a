use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

use crate::state::AppState;

use super::pipeline::{sync_conversations, ConversationSyncRequest};

/// Runs conversation syncs for a fixed set of agents on an interval.
pub struct SyncScheduler {
    state: AppState,
    agent_ids: Vec<String>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(state: AppState, agent_ids: Vec<String>, interval: Duration) -> Self {
        Self {
            state,
            agent_ids,
            interval,
        }
    }

    pub fn from_state(state: AppState) -> Self {
        let agent_ids = state.config.sync_agent_ids.clone();
        let interval = state.config.sync_interval;
        Self::new(state, agent_ids, interval)
    }

    pub async fn run(&self) {
        info!(
            agents = self.agent_ids.len(),
            interval_secs = self.interval.as_secs(),
            "sync scheduler started"
        );
        loop {
            let synced = self.tick().await;
            info!(synced, "sync tick finished");
            sleep(self.interval).await;
        }
    }

    /// One pass over every agent. Returns how many agents synced without a
    /// run-level error.
    pub async fn tick(&self) -> usize {
        let mut synced = 0;
        for agent_id in &self.agent_ids {
            let request = ConversationSyncRequest {
                agent_id: agent_id.clone(),
                ..ConversationSyncRequest::default()
            };
            match sync_conversations(&self.state, request).await {
                Ok(run) => {
                    synced += 1;
                    info!(
                        agent_id = %agent_id,
                        status = run.status.as_str(),
                        total = run.report.summary.total,
                        failed = run.report.summary.error,
                        "scheduled sync completed"
                    );
                }
                Err(err) => {
                    error!(agent_id = %agent_id, error = %err, "scheduled sync failed");
                }
            }
        }
        synced
    }
}

//! Pulls calls from the voice platform into local storage.

mod orchestrator;
mod pipeline;
mod scheduler;
mod status;

pub use orchestrator::{
    sync_calls, ExternalCall, SyncAction, SyncError, SyncItemResult, SyncOptions, SyncReport,
    SyncSummary, PROVIDER, UNKNOWN_CALLER,
};
pub use pipeline::{
    sync_conversations, sync_history, ConversationSyncRequest, HistorySyncRequest, SyncRun,
    DEFAULT_HISTORY_ITEMS,
};
pub use scheduler::SyncScheduler;
pub use status::{
    load_sync_status, record_sync_status, status_key, SyncState, CONVERSATIONS_PROVIDER,
    HISTORY_PROVIDER,
};

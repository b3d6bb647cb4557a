mod client;
mod error;
mod retry;
mod types;

pub use client::{
    ElevenLabsClient, ElevenLabsResult, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, MAX_HISTORY_REQUESTS,
};
pub use error::ElevenLabsError;
pub use retry::{
    fetch_with_retry, HttpTransport, ReqwestTransport, RetryPolicy, TransportError,
    DEFAULT_RETRY_AFTER_SECS,
};
pub use types::{
    render_transcript, ConversationAnalysis, ConversationDetail, ConversationMetadata,
    ConversationPage, ConversationQuery, ConversationSummary, DashboardSettings, HistoryItem,
    HistoryPage, PhoneCallMetadata, TranscriptTurn,
};

#[cfg(test)]
pub(crate) use retry::testing;

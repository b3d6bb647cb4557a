use std::sync::Arc;

use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Method, Request};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::error::ElevenLabsError;
use super::retry::{fetch_with_retry, HttpTransport, RetryPolicy};
use super::types::{
    ConversationDetail, ConversationPage, ConversationQuery, ConversationSummary,
    DashboardSettings, HistoryItem, HistoryPage, TranscriptTurn,
};

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_HISTORY_REQUESTS: usize = 10;

const API_KEY_HEADER: &str = "xi-api-key";

pub type ElevenLabsResult<T> = Result<T, ElevenLabsError>;

/// Read-only facade over the ElevenLabs REST API. Every call is a GET.
#[derive(Clone)]
pub struct ElevenLabsClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    api_key: HeaderValue,
    retry: RetryPolicy,
}

impl ElevenLabsClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: &str,
        api_key: &str,
        retry: RetryPolicy,
    ) -> ElevenLabsResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| ElevenLabsError::BadRequest(format!("invalid base url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ElevenLabsError::BadRequest(format!(
                "invalid base url: {base_url}"
            )));
        }
        if api_key.trim().is_empty() {
            return Err(ElevenLabsError::BadRequest("api key is empty".into()));
        }
        let mut api_key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| ElevenLabsError::BadRequest("api key is not a valid header".into()))?;
        api_key.set_sensitive(true);

        Ok(Self {
            transport,
            base_url,
            api_key,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ElevenLabsResult<T> {
        let mut request = Request::new(Method::GET, url);
        request
            .headers_mut()
            .insert(API_KEY_HEADER, self.api_key.clone());
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = fetch_with_retry(self.transport.as_ref(), request, &self.retry).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ElevenLabsError::Decode(err.to_string()))?;

        if !status.is_success() {
            return Err(ElevenLabsError::from_status(status, &body));
        }

        serde_json::from_str(&body).map_err(|err| ElevenLabsError::Decode(err.to_string()))
    }

    pub async fn list_conversations(
        &self,
        query: &ConversationQuery,
        cursor: Option<&str>,
    ) -> ElevenLabsResult<ConversationPage> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(agent_id) = query.agent_id.as_deref().filter(|id| !id.is_empty()) {
            params.push(("agent_id", agent_id.to_string()));
        }
        if let Some(from) = query.from_unix {
            params.push(("call_start_after_unix", from.to_string()));
        }
        if let Some(to) = query.to_unix {
            params.push(("call_start_before_unix", to.to_string()));
        }
        let page_size = if query.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            query.page_size
        };
        params.push(("page_size", page_size.to_string()));
        if let Some(cursor) = cursor.filter(|cursor| !cursor.is_empty()) {
            params.push(("cursor", cursor.to_string()));
        }

        let url = self.endpoint(&["v1", "convai", "conversations"], &params);
        self.get_json(url).await
    }

    /// Follows cursors until exhausted or `max_pages` pages were read.
    pub async fn list_all_conversations(
        &self,
        query: &ConversationQuery,
        max_pages: u32,
    ) -> ElevenLabsResult<Vec<ConversationSummary>> {
        let mut conversations = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self.list_conversations(query, cursor.as_deref()).await?;
            pages += 1;
            let next = page.continuation().map(str::to_string);
            debug!(
                page = pages,
                items = page.conversations.len(),
                has_next = next.is_some(),
                "fetched conversation page"
            );
            conversations.extend(page.conversations);

            match next {
                None => break,
                Some(_) if pages >= max_pages.max(1) => {
                    warn!(
                        pages,
                        collected = conversations.len(),
                        "conversation page cap reached with more data remaining"
                    );
                    break;
                }
                Some(next) => cursor = Some(next),
            }
        }

        Ok(conversations)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> ElevenLabsResult<ConversationDetail> {
        let id = required_id(conversation_id, "conversation id")?;
        let url = self.endpoint(&["v1", "convai", "conversations", id], &[]);
        self.get_json(url).await
    }

    pub async fn get_conversation_transcript(
        &self,
        conversation_id: &str,
    ) -> ElevenLabsResult<Vec<TranscriptTurn>> {
        let detail = self.get_conversation(conversation_id).await?;
        Ok(detail.transcript)
    }

    pub async fn get_dashboard_settings(&self) -> ElevenLabsResult<DashboardSettings> {
        let url = self.endpoint(&["v1", "convai", "settings", "dashboard"], &[]);
        self.get_json(url).await
    }

    /// Legacy text-to-speech history, paginated until exhausted, `max_items`
    /// collected, or `MAX_HISTORY_REQUESTS` requests made.
    pub async fn get_history(
        &self,
        voice_id: Option<&str>,
        page_size: u32,
        max_items: usize,
    ) -> ElevenLabsResult<Vec<HistoryItem>> {
        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        let mut items: Vec<HistoryItem> = Vec::new();
        let mut start_after: Option<String> = None;
        let mut requests = 0usize;

        while items.len() < max_items && requests < MAX_HISTORY_REQUESTS {
            let mut params = vec![("page_size", page_size.to_string())];
            if let Some(voice_id) = voice_id.filter(|id| !id.is_empty()) {
                params.push(("voice_id", voice_id.to_string()));
            }
            if let Some(after) = start_after.as_deref() {
                params.push(("start_after_history_item_id", after.to_string()));
            }

            let url = self.endpoint(&["v1", "history"], &params);
            let page: HistoryPage = self.get_json(url).await?;
            requests += 1;

            let fetched = page.history.len();
            items.extend(page.history);

            match page.last_history_item_id.filter(|id| !id.is_empty()) {
                Some(last) if page.has_more && fetched > 0 => start_after = Some(last),
                _ => break,
            }
        }

        if requests >= MAX_HISTORY_REQUESTS && items.len() < max_items {
            warn!(
                requests,
                collected = items.len(),
                "history request cap reached"
            );
        }

        items.truncate(max_items);
        Ok(items)
    }

    pub fn conversation_audio_url(&self, conversation_id: &str) -> String {
        self.endpoint(&["v1", "convai", "conversations", conversation_id, "audio"], &[])
            .to_string()
    }

    pub fn history_audio_url(&self, history_item_id: &str) -> String {
        self.endpoint(&["v1", "history", history_item_id, "audio"], &[])
            .to_string()
    }
}

fn required_id<'a>(value: &'a str, what: &str) -> ElevenLabsResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ElevenLabsError::BadRequest(format!("{what} must not be empty")));
    }
    Ok(trimmed)
}

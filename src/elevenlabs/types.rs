use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
pub struct ConversationQuery {
    pub agent_id: Option<String>,
    pub from_unix: Option<i64>,
    pub to_unix: Option<i64>,
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationPage {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

impl ConversationPage {
    /// The cursor for the following page. A page without `has_more` is the
    /// last one, whatever cursor it carries.
    pub fn continuation(&self) -> Option<&str> {
        if !self.has_more {
            return None;
        }
        self.next_cursor
            .as_deref()
            .filter(|cursor| !cursor.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConversationSummary {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub start_time_unix_secs: i64,
    #[serde(default)]
    pub call_duration_secs: i64,
    #[serde(default)]
    pub message_count: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub call_successful: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConversationDetail {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
    #[serde(default)]
    pub metadata: ConversationMetadata,
    #[serde(default)]
    pub analysis: Option<ConversationAnalysis>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ConversationMetadata {
    #[serde(default)]
    pub start_time_unix_secs: Option<i64>,
    #[serde(default)]
    pub call_duration_secs: Option<i64>,
    #[serde(default)]
    pub phone_call: Option<PhoneCallMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PhoneCallMetadata {
    #[serde(default)]
    pub external_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ConversationAnalysis {
    #[serde(default)]
    pub call_successful: Option<String>,
    #[serde(default)]
    pub transcript_summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TranscriptTurn {
    pub role: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub time_in_call_secs: Option<i64>,
}

/// Renders turns as `role: message` lines, skipping empty messages.
pub fn render_transcript(turns: &[TranscriptTurn]) -> Option<String> {
    let lines: Vec<String> = turns
        .iter()
        .filter_map(|turn| {
            let message = turn.message.as_deref()?.trim();
            (!message.is_empty()).then(|| format!("{}: {}", turn.role, message))
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryPage {
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub last_history_item_id: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HistoryItem {
    pub history_item_id: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub voice_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date_unix: i64,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct DashboardSettings {
    #[serde(default)]
    pub charts: Vec<Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

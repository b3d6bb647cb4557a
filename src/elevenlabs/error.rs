use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use super::retry::TransportError;

#[derive(Debug, Error)]
pub enum ElevenLabsError {
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("voice api rejected credentials: {0}")]
    Auth(String),
    #[error("voice api resource not found: {0}")]
    NotFound(String),
    #[error("voice api quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("voice api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to decode voice api response: {0}")]
    Decode(String),
}

impl ElevenLabsError {
    pub fn code(&self) -> &'static str {
        match self {
            ElevenLabsError::BadRequest(_) => "BAD_REQUEST",
            ElevenLabsError::Auth(_) => "AUTH_ERROR",
            ElevenLabsError::NotFound(_) => "NOT_FOUND",
            ElevenLabsError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            ElevenLabsError::Api { .. }
            | ElevenLabsError::Transport(_)
            | ElevenLabsError::Decode(_) => "API_ERROR",
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = upstream_message(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
        match status {
            StatusCode::UNAUTHORIZED => ElevenLabsError::Auth(message),
            StatusCode::NOT_FOUND => ElevenLabsError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ElevenLabsError::QuotaExceeded(message),
            _ => ElevenLabsError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

const MAX_MESSAGE_LEN: usize = 300;

/// Prefers `detail.message`, then a string `detail`, then the raw body.
fn upstream_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| match value.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(Value::Object(detail)) => detail
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        });

    let message = from_json.unwrap_or_else(|| trimmed.to_string());
    Some(message.chars().take(MAX_MESSAGE_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_status() {
        assert_eq!(
            ElevenLabsError::from_status(StatusCode::UNAUTHORIZED, "").code(),
            "AUTH_ERROR"
        );
        assert_eq!(
            ElevenLabsError::from_status(StatusCode::NOT_FOUND, "").code(),
            "NOT_FOUND"
        );
        assert_eq!(
            ElevenLabsError::from_status(StatusCode::TOO_MANY_REQUESTS, "").code(),
            "QUOTA_EXCEEDED"
        );
        assert_eq!(
            ElevenLabsError::from_status(StatusCode::BAD_REQUEST, "").code(),
            "API_ERROR"
        );
        assert_eq!(
            ElevenLabsError::from_status(StatusCode::SERVICE_UNAVAILABLE, "").code(),
            "API_ERROR"
        );
    }

    #[test]
    fn extracts_detail_message() {
        let err = ElevenLabsError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"detail":{"status":"invalid_api_key","message":"Invalid API key"}}"#,
        );
        assert_eq!(err.to_string(), "voice api rejected credentials: Invalid API key");

        let err = ElevenLabsError::from_status(StatusCode::NOT_FOUND, r#"{"detail":"Not Found"}"#);
        assert_eq!(err.to_string(), "voice api resource not found: Not Found");
    }

    #[test]
    fn falls_back_to_reason_phrase() {
        let err = ElevenLabsError::from_status(StatusCode::BAD_GATEWAY, "  ");
        assert_eq!(err.to_string(), "voice api error (502): Bad Gateway");
    }
}

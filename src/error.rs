use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

use crate::config::ConfigError;
use crate::elevenlabs::ElevenLabsError;
use crate::sync::SyncError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MissingEnvVar,
    DbError,
    UpstreamAuthError,
    UpstreamNotFound,
    UpstreamQuotaExceeded,
    UpstreamApiError,
    InternalServerError,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    details: Option<Value>,
}

impl AppError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, message)
    }

    /// A `BAD_REQUEST` naming the offending request field in `details`.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::bad_request(message).with_details(serde_json::json!({ "field": field }))
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            ErrorCode::Forbidden,
            "access to this resource is not allowed",
        )
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, "resource not found")
    }

    pub fn missing_env(name: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::MissingEnvVar,
            format!("{name} is not configured"),
        )
    }

    /// Logs the underlying error and hides it from the caller.
    pub fn internal<E: Display>(error: E) -> Self {
        tracing::error!(error = %error, "internal server error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalServerError,
            "internal server error",
        )
    }

    pub fn database<E: Display>(error: E) -> Self {
        tracing::error!(error = %error, "database error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DbError,
            "database error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
            timestamp: Utc::now().to_rfc3339(),
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
    timestamp: String,
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::database(value),
        }
    }
}

impl From<ElevenLabsError> for AppError {
    fn from(value: ElevenLabsError) -> Self {
        let (status, code) = match &value {
            ElevenLabsError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadRequest),
            ElevenLabsError::Auth(_) => (StatusCode::BAD_GATEWAY, ErrorCode::UpstreamAuthError),
            ElevenLabsError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::UpstreamNotFound),
            ElevenLabsError::QuotaExceeded(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorCode::UpstreamQuotaExceeded,
            ),
            ElevenLabsError::Api { .. }
            | ElevenLabsError::Transport(_)
            | ElevenLabsError::Decode(_) => (StatusCode::BAD_GATEWAY, ErrorCode::UpstreamApiError),
        };
        tracing::warn!(error = %value, code = value.code(), "voice api request failed");
        AppError::new(status, code, value.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::MissingEnvVar(name) => AppError::missing_env(name),
            other => AppError::internal(other),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::MissingAgentId => AppError::bad_request(value.to_string()),
            SyncError::Database(err) => err.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn error_envelope_carries_code_and_timestamp() {
        let (status, body) = body_json(
            AppError::invalid_field("limit", "limit must be between 1 and 100"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "limit must be between 1 and 100");
        assert_eq!(body["error"]["details"]["field"], "limit");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let (status, body) =
            body_json(AppError::internal("connection refused at 10.0.0.3:5432")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_SERVER_ERROR");
        assert_eq!(body["error"]["message"], "internal server error");
        assert!(body["error"].get("details").is_none());
    }

    #[test]
    fn upstream_errors_map_to_gateway_statuses() {
        let cases = [
            (
                ElevenLabsError::Auth("invalid api key".into()),
                StatusCode::BAD_GATEWAY,
                ErrorCode::UpstreamAuthError,
            ),
            (
                ElevenLabsError::NotFound("conversation missing".into()),
                StatusCode::NOT_FOUND,
                ErrorCode::UpstreamNotFound,
            ),
            (
                ElevenLabsError::QuotaExceeded("slow down".into()),
                StatusCode::TOO_MANY_REQUESTS,
                ErrorCode::UpstreamQuotaExceeded,
            ),
            (
                ElevenLabsError::Api {
                    status: 503,
                    message: "unavailable".into(),
                },
                StatusCode::BAD_GATEWAY,
                ErrorCode::UpstreamApiError,
            ),
            (
                ElevenLabsError::BadRequest("conversation id must not be empty".into()),
                StatusCode::BAD_REQUEST,
                ErrorCode::BadRequest,
            ),
        ];

        for (upstream, status, code) in cases {
            let error = AppError::from(upstream);
            assert_eq!(error.status(), status);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn diesel_not_found_becomes_not_found() {
        let error = AppError::from(diesel::result::Error::NotFound);
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert_eq!(error.code(), ErrorCode::NotFound);

        let error = AppError::from(diesel::result::Error::RollbackTransaction);
        assert_eq!(error.code(), ErrorCode::DbError);
    }

    #[test]
    fn missing_env_var_is_distinguishable() {
        let error = AppError::from(ConfigError::MissingEnvVar("ELEVENLABS_API_KEY"));
        assert_eq!(error.code(), ErrorCode::MissingEnvVar);
        assert!(error.message().contains("ELEVENLABS_API_KEY"));
    }
}

//! Request, query, and error types shared by the gateway handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tern_protocol::ApiEnvelope;

/// Failure mapped to the `{ success: false, message, data: null }` envelope.
#[derive(Debug)]
pub(super) struct ApiError {
    pub(super) status: StatusCode,
    pub(super) message: String,
}

impl ApiError {
    pub(super) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(super) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub(super) fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    }

    pub(super) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::warn!(error = %format!("{error:#}"), "conversation store failure");
        Self::internal(format!("{error:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiEnvelope::<()>::failure(self.message)),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ChatStreamQuery {
    #[serde(default)]
    pub(super) message: Option<String>,
    #[serde(default)]
    pub(super) conversation_id: Option<String>,
}

/// Query accepted by the conversation routes; body fields take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConversationIdQuery {
    #[serde(default)]
    pub(super) id: Option<String>,
    #[serde(default)]
    pub(super) conversation_id: Option<String>,
    #[serde(default)]
    pub(super) title: Option<String>,
    #[serde(default)]
    pub(super) preview: Option<String>,
    #[serde(default)]
    pub(super) message_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CreateConversationBody {
    #[serde(default)]
    pub(super) title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct DeleteConversationBody {
    #[serde(default)]
    pub(super) id: Option<String>,
}

/// Parses an optional JSON body, treating empty or malformed input as absent fields.
pub(super) fn parse_lenient_body<T: Default + serde::de::DeserializeOwned>(body: &[u8]) -> T {
    if body.iter().all(u8::is_ascii_whitespace) {
        return T::default();
    }
    serde_json::from_slice(body).unwrap_or_default()
}

pub(super) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

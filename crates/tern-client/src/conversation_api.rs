//! HTTP client for the conversation routes served next to the chat stream.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::json;
use tern_protocol::{ApiEnvelope, Conversation, ConversationMessages, ConversationPatch, StoredMessage};

use crate::transport::{DEFAULT_BASE_URL, USER_ID_HEADER};
use crate::{HistorySource, TernClientError};

const CONVERSATIONS_PATH: &str = "/api/conversations";
const CONVERSATION_MESSAGES_PATH: &str = "/api/conversations/messages";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `ConversationApiConfig` used across Tern components.
pub struct ConversationApiConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub user_id: Option<String>,
}

impl Default for ConversationApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 10_000,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone)]
/// Public struct `ConversationApiClient` used across Tern components.
pub struct ConversationApiClient {
    client: reqwest::Client,
    config: ConversationApiConfig,
}

impl ConversationApiClient {
    pub fn new(config: ConversationApiConfig) -> Result<Self, TernClientError> {
        if config.base_url.trim().is_empty() {
            return Err(TernClientError::InvalidConfig(
                "base_url must be non-empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match self.config.user_id.as_deref() {
            Some(user_id) => builder.header(USER_ID_HEADER, user_id),
            None => builder,
        }
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, TernClientError> {
        let response = self
            .request(reqwest::Method::GET, CONVERSATIONS_PATH)
            .send()
            .await?;
        Ok(read_envelope::<Vec<Conversation>>(response)
            .await?
            .unwrap_or_default())
    }

    pub async fn create_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<Conversation, TernClientError> {
        let body = match title {
            Some(title) => json!({ "title": title }),
            None => json!({}),
        };
        let response = self
            .request(reqwest::Method::POST, CONVERSATIONS_PATH)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?;
        require_data(read_envelope(response).await?)
    }

    /// Applies `patch` to conversation `id`; the id travels in the body.
    pub async fn update_conversation(
        &self,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<Conversation, TernClientError> {
        let body = ConversationPatch {
            id: Some(id.to_string()),
            ..patch.clone()
        };
        let response = self
            .request(reqwest::Method::PATCH, CONVERSATIONS_PATH)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(&body)?)
            .send()
            .await?;
        require_data(read_envelope(response).await?)
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), TernClientError> {
        let response = self
            .request(reqwest::Method::DELETE, CONVERSATIONS_PATH)
            .query(&[("id", id)])
            .send()
            .await?;
        read_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<ConversationMessages, TernClientError> {
        let response = self
            .request(reqwest::Method::GET, CONVERSATION_MESSAGES_PATH)
            .query(&[("conversationId", conversation_id)])
            .send()
            .await?;
        Ok(read_envelope::<ConversationMessages>(response)
            .await?
            .unwrap_or_else(|| ConversationMessages {
                conversation_id: conversation_id.to_string(),
                messages: Vec::new(),
            }))
    }
}

#[async_trait]
impl HistorySource for ConversationApiClient {
    async fn load_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>, TernClientError> {
        Ok(self.conversation_messages(conversation_id).await?.messages)
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, TernClientError> {
    let status = response.status();
    let body = response.text().await?;
    let envelope = match serde_json::from_str::<ApiEnvelope<T>>(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(TernClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Err(error) => return Err(error.into()),
    };
    if !status.is_success() || !envelope.success {
        let message = envelope
            .message
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
        return Err(TernClientError::Api(message));
    }
    Ok(envelope.data)
}

fn require_data<T>(data: Option<T>) -> Result<T, TernClientError> {
    data.ok_or_else(|| TernClientError::Api("response envelope carried no data".to_string()))
}

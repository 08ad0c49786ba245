//! Chat message and per-session state types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tern_core::{current_unix_timestamp_ms, generate_local_id};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageRole` values.
pub enum MessageRole {
    User,
    Assistant,
    AskUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// One verbatim record of a thinking-class frame.
pub struct ThinkingLogEntry {
    pub timestamp: u64,
    pub event_type: String,
    pub raw_data: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AskUserFieldType {
    Text,
    Password,
    Select,
    Textarea,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskUserOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One input requested by an interactive form.
pub struct AskUserField {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub field_type: AskUserFieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<AskUserOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AskUserStatus {
    Pending,
    Finish,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Interactive form state; present on a message only as a whole.
pub struct AskUserForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub title: String,
    pub fields: Vec<AskUserField>,
    pub status: AskUserStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Message shape persisted by the conversation store and returned by history endpoints.
pub struct StoredMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Client-side chat message, mutated by the assembler while its stream is live.
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: u64,
    #[serde(default)]
    pub is_thinking: bool,
    #[serde(default)]
    pub thinking_log: Vec<ThinkingLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_user: Option<AskUserForm>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: generate_local_id("msg"),
            role,
            content: content.into(),
            timestamp: current_unix_timestamp_ms(),
            is_thinking: false,
            thinking_log: Vec::new(),
            ask_user: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Empty assistant message that a stream will fill in.
    pub fn assistant_placeholder() -> Self {
        Self::new(MessageRole::Assistant, String::new())
    }

    /// Rebuilds a message from history; thinking state is never replayed.
    pub fn from_stored(stored: StoredMessage) -> Self {
        Self {
            id: stored.id,
            role: stored.role,
            content: stored.content,
            timestamp: stored.timestamp,
            is_thinking: false,
            thinking_log: Vec::new(),
            ask_user: None,
        }
    }

    pub fn is_ask_user_pending(&self) -> bool {
        matches!(
            &self.ask_user,
            Some(form) if form.status == AskUserStatus::Pending
        )
    }

    /// Records answers for a pending form and marks it finished.
    ///
    /// Returns `false` when there is no pending form.
    pub fn finish_ask_user(&mut self, answers: &BTreeMap<String, String>) -> bool {
        let Some(form) = self.ask_user.as_mut() else {
            return false;
        };
        if form.status != AskUserStatus::Pending {
            return false;
        }
        for field in &mut form.fields {
            if let Some(answer) = answers.get(&field.id) {
                field.answer = Some(answer.clone());
            }
        }
        form.status = AskUserStatus::Finish;
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Per-session stream flags. `is_streaming` implies `is_loading`.
pub struct ChatState {
    pub is_loading: bool,
    pub is_streaming: bool,
    pub error: Option<String>,
}

impl ChatState {
    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_streaming
    }
}

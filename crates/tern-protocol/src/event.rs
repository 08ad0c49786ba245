//! Event vocabulary and payload encodings for chat stream frames.

use std::fmt;

use serde::Deserialize;

use crate::message::{AskUserField, AskUserForm, AskUserStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Enumerates recognized stream event names.
pub enum StreamEventKind {
    Content,
    Thinking,
    ToolCall,
    ToolResult,
    ToolError,
    AskUser,
    Done,
    Error,
    Other(String),
}

impl StreamEventKind {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "content" => Self::Content,
            "thinking" => Self::Thinking,
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "tool_error" => Self::ToolError,
            "ask_user" => Self::AskUser,
            "done" => Self::Done,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Content => "content",
            Self::Thinking => "thinking",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::ToolError => "tool_error",
            Self::AskUser => "ask_user",
            Self::Done => "done",
            Self::Error => "error",
            Self::Other(name) => name.as_str(),
        }
    }

    /// `done` and `error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Events that put the message into the thinking phase and are logged verbatim.
    pub fn is_thinking_class(&self) -> bool {
        matches!(
            self,
            Self::Thinking | Self::ToolCall | Self::ToolResult | Self::ToolError
        )
    }
}

impl fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Decoded `content` payload: producers send either `{"content": "..."}` or bare text.
pub enum ContentPayload {
    Object { content: String },
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireContentPayload {
    Object { content: String },
    Text(String),
}

impl ContentPayload {
    /// Decodes `raw`, falling back to the raw text when it is not one of the JSON shapes.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<WireContentPayload>(raw) {
            Ok(WireContentPayload::Object { content }) => Self::Object { content },
            Ok(WireContentPayload::Text(text)) => Self::Text(text),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Object { content } => content,
            Self::Text(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Object { content } => content,
            Self::Text(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Decoded `error` payload text.
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireErrorPayload {
    Message { message: String },
    Error { error: String },
    Text(String),
}

impl ErrorPayload {
    pub fn decode(raw: &str) -> Self {
        let message = match serde_json::from_str::<WireErrorPayload>(raw) {
            Ok(WireErrorPayload::Message { message }) => message,
            Ok(WireErrorPayload::Error { error }) => error,
            Ok(WireErrorPayload::Text(text)) => text,
            Err(_) => raw.to_string(),
        };
        Self { message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Interactive form request carried by an `ask_user` frame.
pub struct AskUserPayload {
    #[serde(default, alias = "askUserMessageId")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<AskUserField>,
}

impl AskUserPayload {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn into_form(self) -> AskUserForm {
        AskUserForm {
            message_id: self.message_id,
            title: self.title,
            fields: self.fields,
            status: AskUserStatus::Pending,
        }
    }
}

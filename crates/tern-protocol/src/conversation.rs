//! Conversation entities shared by the store, the gateway routes, and the API client.

use serde::{Deserialize, Serialize};

use crate::message::StoredMessage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Conversation summary as listed by the store.
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub preview: String,
    pub create_time: u64,
    pub update_time: u64,
    #[serde(default)]
    pub message_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Partial update; absent fields are left untouched.
pub struct ConversationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
}

impl ConversationPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.preview.is_none() && self.message_count.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessages {
    pub conversation_id: String,
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// JSON envelope used by every conversation endpoint.
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ApiEnvelope, Conversation, ConversationPatch};

    #[test]
    fn unit_conversation_uses_camel_case_wire_names() {
        let conversation = Conversation {
            id: "conv_1".to_string(),
            title: "Plans".to_string(),
            preview: String::new(),
            create_time: 10,
            update_time: 11,
            message_count: 0,
        };
        let value = serde_json::to_value(&conversation).expect("serialize");
        assert_eq!(value["createTime"], json!(10));
        assert_eq!(value["messageCount"], json!(0));
    }

    #[test]
    fn unit_patch_is_empty_ignores_id() {
        let patch = ConversationPatch {
            id: Some("conv_1".to_string()),
            ..ConversationPatch::default()
        };
        assert!(patch.is_empty());
    }

    #[test]
    fn unit_failure_envelope_serializes_null_data() {
        let envelope = ApiEnvelope::<()>::failure("missing id");
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(
            value,
            json!({"success": false, "message": "missing id", "data": null})
        );
    }
}

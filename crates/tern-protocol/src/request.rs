use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Parameters of the request that opens a chat stream.
pub struct ChatStreamRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatStreamRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: Option<impl Into<String>>) -> Self {
        self.conversation_id = conversation_id
            .map(Into::into)
            .filter(|id: &String| !id.is_empty());
        self
    }

    /// Query pairs in wire order; the conversation id is forwarded unchanged.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![("message", self.message.as_str())];
        if let Some(conversation_id) = self.conversation_id.as_deref() {
            pairs.push(("conversationId", conversation_id));
        }
        pairs
    }
}

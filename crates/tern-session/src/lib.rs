//! Conversation and message-history store used by the reference emitter.
//!
//! The store is an external collaborator of the streaming core: the emitter
//! appends the inbound user text and the assembled assistant reply, and the
//! history endpoint lists them back in order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tern_core::{current_unix_timestamp_ms, generate_local_id, write_text_atomic};
use tern_protocol::{Conversation, ConversationPatch, StoredMessage};


pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";
const SNAPSHOT_SCHEMA_VERSION: u32 = 1;
const PREVIEW_MAX_CHARS: usize = 80;

/// Trait contract for conversation persistence.
pub trait ConversationStore: Send + Sync {
    fn create(&self, title: Option<&str>) -> Result<Conversation>;

    /// Conversations ordered by most recent update first.
    fn list(&self) -> Result<Vec<Conversation>>;

    fn get(&self, id: &str) -> Result<Option<Conversation>>;

    /// Applies `patch`; `None` when the conversation does not exist.
    fn update(&self, id: &str, patch: &ConversationPatch) -> Result<Option<Conversation>>;

    /// Removes the conversation and its messages; `false` when nothing was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    fn append(&self, conversation_id: &str, message: StoredMessage) -> Result<()>;

    /// Messages in append order; empty for unknown conversations.
    fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConversationStoreState {
    #[serde(default)]
    conversations: BTreeMap<String, Conversation>,
    #[serde(default)]
    messages: BTreeMap<String, Vec<StoredMessage>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConversationSnapshot {
    schema_version: u32,
    #[serde(flatten)]
    state: ConversationStoreState,
}

#[derive(Debug, Default)]
/// Mutex-guarded in-memory store with an optional JSON snapshot file.
pub struct InMemoryConversationStore {
    state: Mutex<ConversationStoreState>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` when it exists and rewrites it after every mutation.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            load_snapshot(&path)?
        } else {
            ConversationStoreState::default()
        };
        tracing::debug!(
            path = %path.display(),
            conversations = state.conversations.len(),
            "loaded conversation snapshot"
        );
        Ok(Self {
            state: Mutex::new(state),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ConversationStoreState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("conversation store lock is poisoned"))
    }

    fn persist(&self, state: &ConversationStoreState) -> Result<()> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };
        let snapshot = ConversationSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            state: state.clone(),
        };
        let encoded = serde_json::to_string_pretty(&snapshot)
            .context("failed to encode conversation snapshot")?;
        write_text_atomic(path, &encoded)
    }

    /// Applies `change` and keeps it only once the snapshot holding it is written.
    fn commit(
        &self,
        state: &mut ConversationStoreState,
        change: impl FnOnce(&mut ConversationStoreState),
    ) -> Result<()> {
        if self.snapshot_path.is_none() {
            change(state);
            return Ok(());
        }
        let mut next = state.clone();
        change(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn create(&self, title: Option<&str>) -> Result<Conversation> {
        let title = title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let now = current_unix_timestamp_ms();
        let conversation = Conversation {
            id: generate_local_id("conv"),
            title: title.to_string(),
            preview: String::new(),
            create_time: now,
            update_time: now,
            message_count: 0,
        };

        let mut state = self.lock_state()?;
        self.commit(&mut state, |next| {
            next.conversations
                .insert(conversation.id.clone(), conversation.clone());
            next.messages.insert(conversation.id.clone(), Vec::new());
        })?;
        tracing::info!(conversation_id = %conversation.id, title = %conversation.title, "created conversation");
        Ok(conversation)
    }

    fn list(&self) -> Result<Vec<Conversation>> {
        let state = self.lock_state()?;
        let mut conversations = state.conversations.values().cloned().collect::<Vec<_>>();
        conversations.sort_by(|left, right| {
            right
                .update_time
                .cmp(&left.update_time)
                .then_with(|| right.create_time.cmp(&left.create_time))
        });
        Ok(conversations)
    }

    fn get(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.lock_state()?.conversations.get(id).cloned())
    }

    fn update(&self, id: &str, patch: &ConversationPatch) -> Result<Option<Conversation>> {
        let mut state = self.lock_state()?;
        let Some(current) = state.conversations.get(id) else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(current.clone()));
        }

        let mut updated = current.clone();
        if let Some(title) = patch
            .title
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            updated.title = title.to_string();
        }
        if let Some(preview) = patch.preview.as_deref() {
            updated.preview = preview.to_string();
        }
        if let Some(message_count) = patch.message_count {
            updated.message_count = message_count;
        }
        updated.update_time = current_unix_timestamp_ms().max(updated.update_time);

        self.commit(&mut state, |next| {
            next.conversations.insert(id.to_string(), updated.clone());
        })?;
        Ok(Some(updated))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.lock_state()?;
        let known = state.conversations.contains_key(id);
        if !known && !state.messages.contains_key(id) {
            return Ok(false);
        }
        self.commit(&mut state, |next| {
            next.conversations.remove(id);
            next.messages.remove(id);
        })?;
        tracing::info!(conversation_id = %id, "deleted conversation");
        Ok(known)
    }

    fn append(&self, conversation_id: &str, message: StoredMessage) -> Result<()> {
        let mut state = self.lock_state()?;
        self.commit(&mut state, |next| {
            if let Some(conversation) = next.conversations.get_mut(conversation_id) {
                conversation.preview = preview_text(&message.content);
                conversation.message_count = conversation.message_count.saturating_add(1);
                conversation.update_time =
                    current_unix_timestamp_ms().max(conversation.update_time);
            }
            next.messages
                .entry(conversation_id.to_string())
                .or_default()
                .push(message);
        })
    }

    fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .lock_state()?
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}

fn load_snapshot(path: &Path) -> Result<ConversationStoreState> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(ConversationStoreState::default());
    }
    let snapshot = serde_json::from_str::<ConversationSnapshot>(&raw)
        .with_context(|| format!("failed to parse conversation snapshot {}", path.display()))?;
    if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
        anyhow::bail!(
            "unsupported conversation snapshot schema_version {} in {} (expected {})",
            snapshot.schema_version,
            path.display(),
            SNAPSHOT_SCHEMA_VERSION
        );
    }
    Ok(snapshot.state)
}

fn preview_text(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= PREVIEW_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut preview = trimmed.chars().take(PREVIEW_MAX_CHARS).collect::<String>();
    preview.push('…');
    preview
}

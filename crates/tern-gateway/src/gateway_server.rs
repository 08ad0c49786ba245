//! Gateway server state, configuration, and route constants.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Query, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONTENT_TYPE,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::json;
use tern_core::{current_unix_timestamp_ms, generate_local_id};
use tern_protocol::{ApiEnvelope, ConversationMessages, ConversationPatch, MessageRole, StoredMessage};
use tern_session::{ConversationStore, InMemoryConversationStore};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::reference_emitter::{EmitterConfig, EmitterScript, KEEP_ALIVE_COMMENT};

mod conversation_handlers;
mod server_bootstrap;
mod status_handlers;
mod stream_handler;
mod types;

use conversation_handlers::{
    handle_conversation_messages, handle_conversations_create, handle_conversations_delete,
    handle_conversations_list, handle_conversations_method_not_allowed,
    handle_conversations_update,
};
pub use server_bootstrap::{build_gateway_router, run_gateway_server};
use status_handlers::{handle_health, handle_tools};
use stream_handler::handle_chat_stream;
use types::{ApiError, ChatStreamQuery, ConversationIdQuery, CreateConversationBody};

pub const CHAT_STREAM_ENDPOINT: &str = "/api/chat/stream";
pub const HEALTH_ENDPOINT: &str = "/api/health";
pub const TOOLS_ENDPOINT: &str = "/api/tools";
pub const CONVERSATIONS_ENDPOINT: &str = "/api/conversations";
pub const CONVERSATION_MESSAGES_ENDPOINT: &str = "/api/conversations/messages";
pub const DEFAULT_GATEWAY_BIND: &str = "127.0.0.1:3002";
const CONVERSATION_SNAPSHOT_FILE: &str = "conversations.json";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `GatewayServerConfig` used across Tern components.
pub struct GatewayServerConfig {
    pub bind: String,
    /// Directory for the conversation snapshot; `None` keeps conversations in memory only.
    pub state_dir: Option<PathBuf>,
    pub emitter: EmitterConfig,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_GATEWAY_BIND.to_string(),
            state_dir: None,
            emitter: EmitterConfig::default(),
        }
    }
}

impl GatewayServerConfig {
    /// Opens the conversation store this configuration describes.
    pub fn open_store(&self) -> Result<Arc<dyn ConversationStore>> {
        match self.state_dir.as_deref() {
            Some(state_dir) => {
                std::fs::create_dir_all(state_dir)
                    .with_context(|| format!("failed to create {}", state_dir.display()))?;
                let store = InMemoryConversationStore::with_snapshot(
                    state_dir.join(CONVERSATION_SNAPSHOT_FILE),
                )?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(InMemoryConversationStore::new())),
        }
    }
}

#[derive(Clone)]
/// Shared state handed to every gateway handler.
pub struct GatewayServerState {
    config: GatewayServerConfig,
    store: Arc<dyn ConversationStore>,
}

impl GatewayServerState {
    pub fn new(config: GatewayServerConfig, store: Arc<dyn ConversationStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &GatewayServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    fn record_message(&self, conversation_id: &str, role: MessageRole, content: &str) -> Result<()> {
        self.store.append(
            conversation_id,
            StoredMessage {
                id: generate_local_id("msg"),
                role,
                content: content.to_string(),
                timestamp: current_unix_timestamp_ms(),
            },
        )
    }
}

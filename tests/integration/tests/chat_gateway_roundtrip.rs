use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tern_client::{
    ChatSession, ConversationApiClient, ConversationApiConfig, StreamOutcome, StreamTransport,
    StreamTransportConfig,
};
use tern_gateway::{build_gateway_router, EmitterConfig, GatewayServerConfig, GatewayServerState};
use tern_protocol::MessageRole;
use tern_session::{ConversationStore, InMemoryConversationStore};
use tokio::net::TcpListener;

struct RunningGateway {
    addr: SocketAddr,
    store: Arc<dyn ConversationStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl RunningGateway {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn spawn_gateway(emitter: EmitterConfig) -> Result<RunningGateway> {
    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    let config = GatewayServerConfig {
        bind: "127.0.0.1:0".to_string(),
        state_dir: None,
        emitter,
    };
    let state = Arc::new(GatewayServerState::new(config, Arc::clone(&store)));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let app = build_gateway_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(RunningGateway {
        addr,
        store,
        handle,
    })
}

fn session_for(gateway: &RunningGateway) -> ChatSession {
    let transport = StreamTransport::new(StreamTransportConfig {
        base_url: gateway.base_url(),
        idle_timeout_ms: 2_000,
        user_id: Some("user_integration".to_string()),
        ..StreamTransportConfig::default()
    })
    .expect("transport config");
    ChatSession::new(transport)
}

fn api_for(gateway: &RunningGateway) -> ConversationApiClient {
    ConversationApiClient::new(ConversationApiConfig {
        base_url: gateway.base_url(),
        ..ConversationApiConfig::default()
    })
    .expect("api config")
}

#[tokio::test]
async fn integration_session_assembles_reply_and_gateway_records_exchange() {
    let gateway = spawn_gateway(EmitterConfig {
        first_frame_delay_ms: 10,
        frame_interval_ms: 15,
        include_reasoning: true,
        ..EmitterConfig::default()
    })
    .await
    .expect("spawn gateway");
    let api = api_for(&gateway);
    let conversation = api
        .create_conversation(Some("Integration"))
        .await
        .expect("create conversation");

    let session = session_for(&gateway);
    let outcome = session
        .stream_message("ping", Some(&conversation.id))
        .await;
    assert_eq!(outcome, StreamOutcome::Completed);

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "ping");
    let reply = &messages[1];
    assert_eq!(reply.role, MessageRole::Assistant);
    assert_eq!(
        reply.content,
        "Hello! I received: \"ping\"This is a simulated streaming response and the emitter is working"
    );
    assert!(!reply.is_thinking);
    let thinking_events = reply
        .thinking_log
        .iter()
        .map(|entry| entry.event_type.as_str())
        .collect::<Vec<_>>();
    assert_eq!(thinking_events, vec!["thinking", "tool_call", "tool_result"]);

    let state = session.state();
    assert!(!state.is_streaming);
    assert!(state.error.is_none());

    let stored = gateway
        .store
        .messages(&conversation.id)
        .expect("stored messages");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, reply.content);
}

#[tokio::test]
async fn integration_cancel_mid_stream_keeps_partial_reply() {
    let gateway = spawn_gateway(EmitterConfig {
        first_frame_delay_ms: 10,
        frame_interval_ms: 150,
        include_reasoning: false,
        ..EmitterConfig::default()
    })
    .await
    .expect("spawn gateway");
    let conversation = gateway
        .store
        .create(Some("Cancelled"))
        .expect("create conversation");

    let session = session_for(&gateway);
    let streaming = {
        let session = session.clone();
        let conversation_id = conversation.id.clone();
        tokio::spawn(async move { session.stream_message("stop", Some(&conversation_id)).await })
    };

    let mut first_delta = String::new();
    for _ in 0..100 {
        if let Some(reply) = session
            .messages()
            .into_iter()
            .find(|message| message.role == MessageRole::Assistant && !message.content.is_empty())
        {
            first_delta = reply.content;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(first_delta, "Hello! I received: \"stop\"");

    assert!(session.cancel());
    let outcome = streaming.await.expect("stream task");
    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert!(!session.cancel());

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, first_delta);
    assert!(!session.state().is_streaming);

    tokio::time::sleep(Duration::from_millis(700)).await;
    let stored = gateway
        .store
        .messages(&conversation.id)
        .expect("stored messages");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, MessageRole::User);
}

#[tokio::test]
async fn integration_history_reload_replays_recorded_exchange() {
    let gateway = spawn_gateway(EmitterConfig {
        first_frame_delay_ms: 5,
        frame_interval_ms: 10,
        include_reasoning: true,
        ..EmitterConfig::default()
    })
    .await
    .expect("spawn gateway");
    let api = api_for(&gateway);
    let conversation = api
        .create_conversation(None)
        .await
        .expect("create conversation");

    let writer = session_for(&gateway);
    assert_eq!(
        writer.stream_message("remember me", Some(&conversation.id)).await,
        StreamOutcome::Completed
    );

    let reader = session_for(&gateway);
    let loaded = reader
        .load_history(&api, &conversation.id)
        .await
        .expect("load history");
    assert_eq!(loaded, 2);
    let replayed = reader.messages();
    assert_eq!(replayed[0].content, "remember me");
    assert_eq!(replayed[1].content, writer.messages()[1].content);
    assert!(replayed.iter().all(|message| message.thinking_log.is_empty()));

    let listed = api.list_conversations().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].message_count, 2);
    assert!(listed[0].preview.starts_with("Hello! I received"));

    // A second exchange on the reloaded session appends after the history.
    assert_eq!(
        reader.stream_message("again", Some(&conversation.id)).await,
        StreamOutcome::Completed
    );
    assert_eq!(reader.messages().len(), 4);
    assert_eq!(
        gateway
            .store
            .messages(&conversation.id)
            .expect("stored messages")
            .len(),
        4
    );
}

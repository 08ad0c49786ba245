use std::time::{Duration, Instant};

use httpmock::prelude::*;
use serde_json::json;
use tern_client::{
    AbortSignal, ChatSession, ConversationApiClient, ConversationApiConfig, StreamOutcome,
    StreamTransport, StreamTransportConfig, TernClientError, TransportEvent,
};
use tern_protocol::{ChatStreamRequest, ConversationPatch, MessageRole};

fn transport_for(server: &MockServer) -> StreamTransport {
    StreamTransport::new(StreamTransportConfig {
        base_url: server.base_url(),
        idle_timeout_ms: 2_000,
        connect_timeout_ms: 2_000,
        user_id: Some("user_test".to_string()),
        ..StreamTransportConfig::default()
    })
    .expect("transport should be created")
}

fn api_for(server: &MockServer) -> ConversationApiClient {
    ConversationApiClient::new(ConversationApiConfig {
        base_url: server.base_url(),
        request_timeout_ms: 2_000,
        user_id: Some("user_test".to_string()),
    })
    .expect("api client should be created")
}

fn mock_stream<'a>(server: &'a MockServer, message: &str, body: &str) -> httpmock::Mock<'a> {
    let body = body.to_string();
    let message = message.to_string();
    server.mock(move |when, then| {
        when.method(GET)
            .path("/api/chat/stream")
            .query_param("message", message.as_str());
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body.as_str());
    })
}

#[tokio::test]
async fn integration_transport_forwards_request_parameters_and_identity() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/chat/stream")
            .query_param("message", "hello")
            .query_param("conversationId", "conv_42")
            .header("x-tern-user-id", "user_test")
            .header("accept", "text/event-stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body("event: content\ndata: {\"content\":\"Hi\"}\n\nevent: done\ndata: \n\n");
    });

    let transport = transport_for(&server);
    let request = ChatStreamRequest::new("hello").with_conversation_id(Some("conv_42"));
    let mut frames = transport
        .open(&request, AbortSignal::new())
        .await
        .expect("stream should open");

    let mut events = Vec::new();
    while let Some(event) = frames.next_event().await {
        events.push(event);
    }

    mock.assert();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], TransportEvent::Frame(frame) if frame.event == "content"));
    assert!(matches!(&events[1], TransportEvent::Frame(frame) if frame.event == "done"));
    assert!(matches!(events[2], TransportEvent::Complete));
}

#[tokio::test]
async fn integration_transport_reports_non_success_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/chat/stream");
        then.status(503).body("upstream unavailable");
    });

    let error = transport_for(&server)
        .open(&ChatStreamRequest::new("hello"), AbortSignal::new())
        .await
        .expect_err("503 should fail");
    assert!(matches!(
        error,
        TernClientError::HttpStatus { status: 503, ref body } if body == "upstream unavailable"
    ));
}

#[tokio::test]
async fn functional_scenario_plain_content_stream() {
    let server = MockServer::start();
    mock_stream(
        &server,
        "greet",
        "event: content\ndata: Hi\n\nevent: content\ndata:  there\n\nevent: done\ndata: \n\n",
    );
    let session = ChatSession::new(transport_for(&server));

    let outcome = session.stream_message("greet", None).await;

    assert_eq!(outcome, StreamOutcome::Completed);
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    let reply = &messages[1];
    assert_eq!(reply.content, "Hi there");
    assert!(!reply.is_thinking);
    let state = session.state();
    assert!(!state.is_loading && !state.is_streaming);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn functional_scenario_thinking_and_tools_before_content() {
    let server = MockServer::start();
    mock_stream(
        &server,
        "sum",
        concat!(
            "event: thinking\ndata: planning\n\n",
            "event: tool_call\ndata: {\"name\":\"calculator\",\"input\":\"2+2\"}\n\n",
            "event: tool_result\ndata: {\"output\":\"4\"}\n\n",
            "event: content\ndata: Done.\n\n",
            "event: done\ndata: \n\n",
        ),
    );
    let session = ChatSession::new(transport_for(&server));

    assert_eq!(
        session.stream_message("sum", None).await,
        StreamOutcome::Completed
    );
    let reply = session.messages().pop().expect("assistant reply");
    let kinds = reply
        .thinking_log
        .iter()
        .map(|entry| entry.event_type.as_str())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec!["thinking", "tool_call", "tool_result"]);
    assert_eq!(
        reply.thinking_log[1].raw_data,
        "{\"name\":\"calculator\",\"input\":\"2+2\"}"
    );
    assert_eq!(reply.content, "Done.");
    assert!(!reply.is_thinking);
}

#[tokio::test]
async fn functional_scenario_backend_error_frame() {
    let server = MockServer::start();
    mock_stream(&server, "fail", "event: error\ndata: backend down\n\n");
    let session = ChatSession::new(transport_for(&server));

    let outcome = session.stream_message("fail", None).await;

    assert_eq!(outcome, StreamOutcome::Failed("backend down".to_string()));
    let reply = session.messages().pop().expect("assistant reply");
    assert!(reply.content.ends_with("\nbackend down"));
    assert_eq!(session.state().error.as_deref(), Some("backend down"));
}

#[tokio::test]
async fn functional_scenario_transport_error_before_any_frame() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("addr");
    drop(listener);

    let transport = StreamTransport::new(StreamTransportConfig {
        base_url: format!("http://{address}"),
        connect_timeout_ms: 500,
        ..StreamTransportConfig::default()
    })
    .expect("transport");
    let session = ChatSession::new(transport);

    let outcome = session.stream_message("hello", None).await;

    assert!(matches!(outcome, StreamOutcome::Failed(_)));
    let reply = session.messages().pop().expect("assistant reply");
    assert_eq!(reply.role, MessageRole::Assistant);
    assert!(reply.content.starts_with('\n'));
    assert!(reply.content.len() > 1);
    let state = session.state();
    assert!(!state.is_streaming && !state.is_loading);
    assert!(state.error.is_some());
}

#[tokio::test]
async fn functional_guard_rejects_overlapping_stream_without_second_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/chat/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .delay(Duration::from_millis(300))
            .body("event: content\ndata: slow\n\nevent: done\ndata: \n\n");
    });
    let session = ChatSession::new(transport_for(&server));

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.stream_message("first", None).await })
    };
    let started = Instant::now();
    while !session.state().is_streaming {
        assert!(started.elapsed() < Duration::from_secs(2), "first stream never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(
        session.stream_message("second", None).await,
        StreamOutcome::Rejected
    );
    assert_eq!(session.messages().len(), 2);

    assert_eq!(first.await.expect("join"), StreamOutcome::Completed);
    mock.assert_calls(1);
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "first");
    assert_eq!(messages[1].content, "slow");
}

#[tokio::test]
async fn functional_cancel_while_connecting_returns_promptly() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/chat/stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .delay(Duration::from_secs(3))
            .body("event: content\ndata: late\n\nevent: done\ndata: \n\n");
    });
    let session = ChatSession::new(transport_for(&server));

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.stream_message("hello", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.cancel());

    let outcome = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("cancel should end the stream promptly")
        .expect("join");
    assert_eq!(outcome, StreamOutcome::Cancelled);
    let state = session.state();
    assert!(!state.is_loading && !state.is_streaming);
    assert!(state.error.is_none());
    assert_eq!(session.messages()[1].content, "");
}

#[tokio::test]
async fn integration_conversation_api_round_trips_envelopes() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/api/conversations")
            .header("x-tern-user-id", "user_test");
        then.status(200).json_body(json!({
            "success": true,
            "message": null,
            "data": [{
                "id": "conv_1",
                "title": "Plans",
                "preview": "",
                "createTime": 1,
                "updateTime": 2,
                "messageCount": 0
            }]
        }));
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/api/conversations")
            .json_body(json!({"title": "Trip"}));
        then.status(200).json_body(json!({
            "success": true,
            "message": null,
            "data": {
                "id": "conv_2",
                "title": "Trip",
                "preview": "",
                "createTime": 3,
                "updateTime": 3,
                "messageCount": 0
            }
        }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE)
            .path("/api/conversations")
            .query_param("id", "conv_1");
        then.status(200)
            .json_body(json!({"success": true, "message": null, "data": null}));
    });

    let api = api_for(&server);
    let conversations = api.list_conversations().await.expect("list");
    assert_eq!(conversations[0].title, "Plans");
    let created = api.create_conversation(Some("Trip")).await.expect("create");
    assert_eq!(created.id, "conv_2");
    api.delete_conversation("conv_1").await.expect("delete");

    list.assert();
    create.assert();
    delete.assert();
}

#[tokio::test]
async fn regression_conversation_api_surfaces_failure_envelope_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(PATCH)
            .path("/api/conversations")
            .json_body_includes(json!({"id": "conv_missing", "title": "x"}).to_string());
        then.status(404).json_body(json!({
            "success": false,
            "message": "conversation not found",
            "data": null
        }));
    });

    let error = api_for(&server)
        .update_conversation(
            "conv_missing",
            &ConversationPatch {
                title: Some("x".to_string()),
                ..ConversationPatch::default()
            },
        )
        .await
        .expect_err("missing conversation");
    assert!(matches!(error, TernClientError::Api(ref message) if message == "conversation not found"));
}

#[tokio::test]
async fn integration_load_history_uses_conversation_messages_route() {
    let server = MockServer::start();
    let messages = server.mock(|when, then| {
        when.method(GET)
            .path("/api/conversations/messages")
            .query_param("conversationId", "conv_9");
        then.status(200).json_body(json!({
            "success": true,
            "message": null,
            "data": {
                "conversationId": "conv_9",
                "messages": [
                    {"id": "m1", "role": "user", "content": "hi", "timestamp": 1},
                    {"id": "m2", "role": "assistant", "content": "hello", "timestamp": 2, "isThinking": true}
                ]
            }
        }));
    });

    let session = ChatSession::new(transport_for(&server));
    let api = api_for(&server);
    let loaded = session
        .load_history(&api, "conv_9")
        .await
        .expect("history should load");

    messages.assert();
    assert_eq!(loaded, 2);
    let history = session.messages();
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[1].content, "hello");
    assert!(!history[1].is_thinking);
}

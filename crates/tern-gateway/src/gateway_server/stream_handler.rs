//! Chat stream route backed by the reference emitter.

use super::*;

pub(super) async fn handle_chat_stream(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<ChatStreamQuery>,
) -> Response {
    let message = query.message.unwrap_or_default();
    let conversation_id = query.conversation_id.filter(|id| !id.is_empty());
    tracing::info!(
        conversation_id = conversation_id.as_deref().unwrap_or(""),
        chars = message.chars().count(),
        "chat stream requested"
    );

    let script = match EmitterScript::for_request(&message, &state.config.emitter) {
        Ok(script) => script,
        Err(error) => return ApiError::internal(format!("{error:#}")).into_response(),
    };

    if let Some(conversation_id) = conversation_id.as_deref() {
        if let Err(error) = state.record_message(conversation_id, MessageRole::User, &message) {
            return ApiError::from(error).into_response();
        }
    }

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(emit_script(Arc::clone(&state), script, conversation_id, tx));

    let body = Body::from_stream(UnboundedReceiverStream::new(rx).map(Ok::<String, Infallible>));
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response()
}

/// Sends each scripted frame at its offset until `done` or until the client goes away.
///
/// Gaps longer than the keep-alive interval are filled with comment frames.
async fn emit_script(
    state: Arc<GatewayServerState>,
    script: EmitterScript,
    conversation_id: Option<String>,
    tx: mpsc::UnboundedSender<String>,
) {
    let keep_alive = state.config.emitter.keep_alive_interval();
    let started = tokio::time::Instant::now();
    for scripted in script.frames() {
        let deadline = started + scripted.offset();
        while tokio::time::Instant::now() + keep_alive < deadline {
            tokio::time::sleep(keep_alive).await;
            if tx.send(KEEP_ALIVE_COMMENT.to_string()).is_err() {
                tracing::info!("client disconnected during keep-alive; stopping emission");
                return;
            }
        }
        tokio::time::sleep_until(deadline).await;

        if scripted.frame.is_terminal() {
            if tx.is_closed() {
                tracing::info!("client disconnected before done; assistant reply not recorded");
                return;
            }
            if let Some(conversation_id) = conversation_id.as_deref() {
                if let Err(error) = state.record_message(
                    conversation_id,
                    MessageRole::Assistant,
                    script.assistant_text(),
                ) {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        error = %format!("{error:#}"),
                        "failed to record assistant reply"
                    );
                }
            }
        }

        if tx.send(scripted.encoded.clone()).is_err() {
            tracing::info!(
                event = %scripted.frame.event,
                "client disconnected; stopping emission"
            );
            return;
        }
    }
    tracing::debug!(
        conversation_id = conversation_id.as_deref().unwrap_or(""),
        frames = script.frames().len(),
        "chat stream completed"
    );
}

//! Conversation CRUD and history routes.

use super::*;
use super::types::{non_empty, parse_lenient_body, DeleteConversationBody};

pub(super) async fn handle_conversations_list(
    State(state): State<Arc<GatewayServerState>>,
) -> Result<Response, ApiError> {
    let conversations = state.store.list()?;
    Ok(Json(ApiEnvelope::ok(conversations)).into_response())
}

pub(super) async fn handle_conversations_create(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<ConversationIdQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_lenient_body::<CreateConversationBody>(&body);
    let title = non_empty(request.title).or_else(|| non_empty(query.title));
    let conversation = state.store.create(title.as_deref())?;
    Ok(Json(ApiEnvelope::ok(conversation)).into_response())
}

pub(super) async fn handle_conversations_update(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<ConversationIdQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_lenient_body::<ConversationPatch>(&body);
    let Some(id) = non_empty(request.id.clone()).or_else(|| non_empty(query.id.clone())) else {
        return Err(ApiError::bad_request("missing id parameter"));
    };

    let message_count = match request.message_count {
        Some(count) => Some(count),
        None => query
            .message_count
            .as_deref()
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ApiError::bad_request(format!("invalid messageCount '{raw}'")))
            })
            .transpose()?,
    };
    let patch = ConversationPatch {
        id: Some(id.clone()),
        title: request.title.or(query.title),
        preview: request.preview.or(query.preview),
        message_count,
    };

    match state.store.update(&id, &patch)? {
        Some(conversation) => {
            tracing::info!(conversation_id = %id, "updated conversation");
            Ok(Json(ApiEnvelope::ok(conversation)).into_response())
        }
        None => Err(ApiError::not_found("conversation not found")),
    }
}

pub(super) async fn handle_conversations_delete(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<ConversationIdQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_lenient_body::<DeleteConversationBody>(&body);
    let Some(id) = non_empty(query.id).or_else(|| non_empty(request.id)) else {
        return Err(ApiError::bad_request("missing id parameter"));
    };
    state.store.delete(&id)?;
    Ok(Json(ApiEnvelope::<()> {
        success: true,
        message: None,
        data: None,
    })
    .into_response())
}

pub(super) async fn handle_conversations_method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

pub(super) async fn handle_conversation_messages(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<ConversationIdQuery>,
) -> Result<Response, ApiError> {
    let Some(conversation_id) = non_empty(query.conversation_id).or_else(|| non_empty(query.id))
    else {
        return Ok(Json(ApiEnvelope::ok(ConversationMessages::default())).into_response());
    };
    let messages = state.store.messages(&conversation_id)?;
    Ok(Json(ApiEnvelope::ok(ConversationMessages {
        conversation_id,
        messages,
    }))
    .into_response())
}

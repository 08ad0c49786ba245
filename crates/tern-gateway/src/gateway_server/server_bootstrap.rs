//! Gateway server bootstrap and router wiring.

use super::*;

/// Binds `config.bind` and serves the gateway until ctrl-c.
pub async fn run_gateway_server(config: GatewayServerConfig) -> Result<()> {
    config.emitter.validate()?;
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let store = config.open_store()?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway server address")?;

    tracing::info!(
        addr = %local_addr,
        endpoint = CHAT_STREAM_ENDPOINT,
        state_dir = %config
            .state_dir
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string()),
        "gateway server listening"
    );
    println!("gateway server listening: addr={local_addr} endpoint={CHAT_STREAM_ENDPOINT}");

    let state = Arc::new(GatewayServerState::new(config, store));
    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")?;

    tracing::info!("gateway server stopped");
    Ok(())
}

pub fn build_gateway_router(state: Arc<GatewayServerState>) -> Router {
    Router::new()
        .route(CHAT_STREAM_ENDPOINT, get(handle_chat_stream))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(TOOLS_ENDPOINT, get(handle_tools))
        .route(
            CONVERSATIONS_ENDPOINT,
            get(handle_conversations_list)
                .post(handle_conversations_create)
                .patch(handle_conversations_update)
                .delete(handle_conversations_delete)
                .fallback(handle_conversations_method_not_allowed),
        )
        .route(
            CONVERSATION_MESSAGES_ENDPOINT,
            get(handle_conversation_messages),
        )
        .layer(middleware::from_fn(apply_cors_headers))
        .with_state(state)
}

/// Answers preflight requests and marks every response as readable from any origin.
async fn apply_cors_headers(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, x-tern-user-id"),
        );
        return response;
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

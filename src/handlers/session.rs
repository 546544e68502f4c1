use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, FromRequestParts, Request},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, warn};

use crate::models::{ClientMessage, ErrorResponse, PollResponse};
use crate::ws::negotiate::merge_offered_subprotocols;
use crate::ws::{ConnectionState, Negotiation};
use crate::AppState;

/// Entry point for `<session-prefix>/<doc_id>`.
///
/// Upgrade requests become a streaming connection; POST requests run one
/// polling exchange.
pub async fn session_endpoint(state: Arc<AppState>, doc_id: String, req: Request) -> Response {
    if doc_id.is_empty() {
        return ErrorResponse::with_status(StatusCode::BAD_REQUEST, "Missing document identifier").into_response();
    }

    if is_upgrade_request(&req) {
        return upgrade(state, doc_id, req).await;
    }

    match *req.method() {
        Method::POST => poll(state, doc_id, req).await,
        Method::GET => {
            ErrorResponse::with_status(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade request").into_response()
        }
        _ => ErrorResponse::with_status(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method").into_response(),
    }
}

fn is_upgrade_request(req: &Request) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

async fn upgrade(state: Arc<AppState>, doc_id: String, req: Request) -> Response {
    debug!(state = %ConnectionState::Connecting, doc = %doc_id, "Upgrade requested");

    let origin = req.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origin_policy.allows(origin) {
        warn!("Rejected upgrade for '{}' from origin {:?}", doc_id, origin);
        return ErrorResponse::with_status(StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    debug!(state = %ConnectionState::Negotiating, doc = %doc_id, "Negotiating subprotocol");
    let (mut parts, _body) = req.into_parts();
    merge_offered_subprotocols(&mut parts.headers);
    let negotiation = Negotiation::from_headers(&parts.headers);

    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("Malformed upgrade for '{}': {}", doc_id, rejection);
            return rejection.into_response();
        }
    };

    let session = match state.registry.get_or_create(&doc_id) {
        Ok(session) => session,
        Err(e) => {
            return ErrorResponse::with_status(StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    debug!(
        doc = %doc_id,
        subprotocol = negotiation.subprotocol.unwrap_or("none"),
        compressed = negotiation.use_compression,
        "Subprotocol selected"
    );

    let settings = state.settings;
    ws.protocols(negotiation.subprotocol)
        .on_failed_upgrade(move |e| error!("Upgrade failed for '{}': {}", doc_id, e))
        .on_upgrade(move |socket| session.serve_connection(socket, settings))
}

async fn poll(state: Arc<AppState>, doc_id: String, req: Request) -> Response {
    if !is_sync_content_type(&req) {
        return ErrorResponse::with_status(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json or application/x-sjson",
        )
        .into_response();
    }

    let body = match axum::body::to_bytes(req.into_body(), state.settings.max_message_size).await {
        Ok(body) => body,
        Err(e) => {
            return ErrorResponse::with_status(StatusCode::BAD_REQUEST, format!("Failed to read body: {}", e))
                .into_response();
        }
    };
    let request: ClientMessage = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return ErrorResponse::with_status(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e))
                .into_response();
        }
    };

    let session = match state.registry.get_or_create(&doc_id) {
        Ok(session) => session,
        Err(e) => {
            return ErrorResponse::with_status(StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    match session.serve_poll(request, &state.settings).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!("Poll exchange failed for '{}': {}", doc_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(PollResponse::error(e.to_string()))).into_response()
        }
    }
}

fn is_sync_content_type(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let mime = v.split(';').next().unwrap_or("").trim();
            mime.eq_ignore_ascii_case("application/json") || mime.eq_ignore_ascii_case("application/x-sjson")
        })
        .unwrap_or(false)
}

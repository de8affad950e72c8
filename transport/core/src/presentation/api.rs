// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Thin HTTP surface: one POST endpoint per agent plus a status probe.
//!
//! The endpoint is a straight pipeline (classify, verify, dispatch, render)
//! with no business logic of its own. Error rendering enforces the wire
//! contract: integrity/authentication failures answer with their terse code,
//! while crypto and handler failures collapse into one indistinguishable
//! "application error".

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::dispatcher::{DispatchReply, SessionDispatcher};
use crate::application::verification::{VerificationGate, VerificationMode};
use crate::domain::config::AgentConfig;
use crate::domain::error::TransportError;
use crate::infrastructure::codec::{self, HEADER_CONTENT_DIGEST};
use crate::infrastructure::digest;

/// Inbound bodies above this size are rejected before any processing.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub struct AgentState {
    pub config: AgentConfig,
    pub gate: Arc<VerificationGate>,
    pub dispatcher: Arc<SessionDispatcher>,
}

/// Build the agent router: the configured message endpoint plus `/status`.
pub fn app(state: Arc<AgentState>) -> Router {
    let route_path = state.config.route_path.clone();
    Router::new()
        .route(&route_path, post(receive_task))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status(State(state): State<Arc<AgentState>>) -> Response {
    Json(json!({
        "name": state.config.name,
        "type": state.config.kind,
        "signed_enabled": state.gate.mode() == VerificationMode::Required,
        "encrypted_ready": state.dispatcher.encrypted_ready(),
        "time": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

async fn receive_task(State(state): State<Arc<AgentState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body: Bytes = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(body) => body,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({"error": "payload-too-large"})),
            )
                .into_response();
        }
    };

    // Gate first: digest and signature run over exactly the received bytes.
    let verified = match state
        .gate
        .verify_request(parts.method.as_str(), parts.uri.path(), &parts.headers, &body)
        .await
    {
        Ok(verified) => verified,
        Err(error) => return render_error(error),
    };

    let mut envelope = codec::decode(&parts.headers);
    envelope.verified_identity = verified.map(|v| v.did);

    match state.dispatcher.dispatch(&envelope, &body).await {
        Ok(reply) => render_reply(reply),
        Err(error) => render_error(error),
    }
}

/// Symmetric re-protection of the response: envelope headers plus a fresh
/// digest over the reply bytes.
fn render_reply(reply: DispatchReply) -> Response {
    let DispatchReply { envelope, body } = reply;
    let mut headers = match codec::encode(&envelope) {
        Ok(headers) => headers,
        Err(error) => return render_error(error),
    };
    match HeaderValue::from_str(&digest::compute(&body)) {
        Ok(value) => {
            headers.insert(HEADER_CONTENT_DIGEST, value);
        }
        Err(e) => return render_error(TransportError::Internal(e.into())),
    }
    (StatusCode::OK, headers, body).into_response()
}

fn render_error(error: TransportError) -> Response {
    let (status, code) = match &error {
        TransportError::Integrity(reason) | TransportError::Authentication(reason) => {
            (StatusCode::UNAUTHORIZED, reason.code().to_string())
        }
        TransportError::SessionNotFound(_) => {
            (StatusCode::NOT_FOUND, "session-not-found".to_string())
        }
        TransportError::MalformedMessage => {
            (StatusCode::BAD_REQUEST, "malformed-message".to_string())
        }
        TransportError::Upstream(_) | TransportError::UpstreamStatus { .. } => {
            (StatusCode::BAD_GATEWAY, "application error".to_string())
        }
        // Crypto, handler, configuration, and internal failures are
        // deliberately indistinguishable on the wire.
        TransportError::Crypto(_)
        | TransportError::Handler(_)
        | TransportError::Internal(_)
        | TransportError::Configuration(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "application error".to_string())
        }
    };
    warn!(%error, status = %status, "request failed");
    (status, Json(json!({ "error": code }))).into_response()
}

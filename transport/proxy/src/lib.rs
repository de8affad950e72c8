// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AEGIS A2A Tamper Proxy
//!
//! On-path adversary harness for the secure-transport demos: forwards every
//! request to a configured upstream agent, optionally corrupting the payload
//! first according to a [`tamper::TamperPolicy`].
//!
//! The proxy recomputes length framing after mutation but never alters the
//! cryptographic headers: signature, digest, and session id pass through
//! verbatim. Responses are relayed unmodified.
//!
//! Kept in its own crate so the production transport never links the
//! adversary code.

pub mod tamper;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{info, warn};

use crate::tamper::{inject, TamperAction, TamperPolicy};

const BODY_LIMIT: usize = 2 * 1024 * 1024;
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ProxyState {
    upstream: String,
    client: reqwest::Client,
    policy: RwLock<TamperPolicy>,
}

impl ProxyState {
    /// `upstream` is the base URL of the next hop, e.g. `http://127.0.0.1:8181`.
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            client: reqwest::Client::new(),
            policy: RwLock::new(TamperPolicy::off()),
        }
    }

    pub fn with_policy(self, policy: TamperPolicy) -> Self {
        *self.policy.write() = policy;
        self
    }

    pub fn policy(&self) -> TamperPolicy {
        self.policy.read().clone()
    }

    /// Switch the injected attack at runtime.
    pub fn set_policy(&self, policy: TamperPolicy) {
        info!(mode = ?policy.mode, "tamper policy changed");
        *self.policy.write() = policy;
    }
}

/// Catch-all router: every path is forwarded to the same path upstream.
pub fn app(state: Arc<ProxyState>) -> Router {
    Router::new().fallback(forward).with_state(state)
}

async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
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

    let policy = state.policy();
    let (body, action) = inject(&parts.headers, body, &policy);
    if action != TamperAction::Untouched {
        info!(
            action = action.as_str(),
            path = parts.uri.path(),
            "payload corrupted in transit"
        );
    }

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.upstream.trim_end_matches('/'), path_and_query);

    // Headers pass through verbatim; only hop-by-hop framing is rebuilt.
    let mut headers = parts.headers.clone();
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let upstream_response = state
        .client
        .request(parts.method.clone(), &url)
        .timeout(UPSTREAM_TIMEOUT)
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await;

    match upstream_response {
        Ok(response) => {
            let status = response.status();
            let mut headers = response.headers().clone();
            headers.remove(header::TRANSFER_ENCODING);
            headers.remove(header::CONTENT_LENGTH);
            match response.bytes().await {
                Ok(bytes) => (status, headers, bytes).into_response(),
                Err(e) => {
                    warn!(error = %e, url, "failed reading upstream response");
                    (
                        StatusCode::BAD_GATEWAY,
                        Json(json!({"error": "bad-gateway"})),
                    )
                        .into_response()
                }
            }
        }
        Err(e) => {
            warn!(error = %e, url, "upstream unreachable");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "bad-gateway"})),
            )
                .into_response()
        }
    }
}

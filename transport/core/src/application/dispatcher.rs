// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session Dispatcher: per-request handshake/data state machine.
//!
//! ```text
//! inbound envelope
//!   └─ classify (codec) ──► Handshake ──► negotiator.respond ─► registry.save
//!                      ──► DataWithSession ─► decrypt ─► handler ─► encrypt
//!                      ──► DataNoSession ─► renegotiate | session-not-found
//!                      ──► Plain ─► handler
//! ```
//!
//! ## Invariants
//!
//! - The business handler runs **at most once** per request, and never after
//!   a failed crypto step; crypto errors return before the handler, which
//!   also keeps handler-error content out of any decryption oracle.
//! - A session is committed to the registry only after the negotiator fully
//!   succeeded; a cancelled request cannot leave a half-registered session.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::collaborators::{HandshakeNegotiator, TaskHandler};
use crate::domain::envelope::{Envelope, ProtectionMode};
use crate::domain::error::TransportError;
use crate::domain::message::TaskMessage;
use crate::domain::registry::SessionRegistry;
use crate::domain::session::SecureSession;

/// Outcome of a dispatched request: reply envelope plus body bytes. The
/// presentation layer renders headers and attaches a fresh digest.
#[derive(Debug)]
pub struct DispatchReply {
    pub envelope: Envelope,
    pub body: Vec<u8>,
}

pub struct SessionDispatcher {
    registry: Arc<dyn SessionRegistry>,
    handler: Arc<dyn TaskHandler>,
    negotiator: Option<Arc<dyn HandshakeNegotiator>>,
}

impl SessionDispatcher {
    /// The registry is injected, never an internal singleton; the same
    /// store can back several dispatchers or be inspected by tests.
    pub fn new(registry: Arc<dyn SessionRegistry>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            registry,
            handler,
            negotiator: None,
        }
    }

    pub fn with_negotiator(mut self, negotiator: Arc<dyn HandshakeNegotiator>) -> Self {
        self.negotiator = Some(negotiator);
        self
    }

    /// True when this dispatcher can establish encrypted sessions.
    pub fn encrypted_ready(&self) -> bool {
        self.negotiator.is_some()
    }

    /// Route one classified inbound request.
    pub async fn dispatch(
        &self,
        envelope: &Envelope,
        body: &[u8],
    ) -> Result<DispatchReply, TransportError> {
        match envelope.mode {
            ProtectionMode::HpkeHandshake => self.handshake(envelope, body).await,
            ProtectionMode::HpkeData => self.data(envelope, body).await,
            ProtectionMode::Plain | ProtectionMode::Signed => self.plain(envelope, body).await,
        }
    }

    async fn handshake(
        &self,
        envelope: &Envelope,
        body: &[u8],
    ) -> Result<DispatchReply, TransportError> {
        let negotiator = self.negotiator.as_ref().ok_or_else(|| {
            TransportError::Configuration("no handshake negotiator configured".to_string())
        })?;

        let context_id = envelope.context_id.as_deref().unwrap_or("");
        let outcome = negotiator.respond(context_id, body).await?;
        let session_id = outcome.session.id.clone();
        self.registry
            .save(outcome.session)
            .await
            .map_err(TransportError::Internal)?;
        info!(session_id = %session_id, "handshake completed, session registered");

        // The negotiator's payload goes back unmodified; it is still
        // digest-guarded by the presentation layer.
        Ok(DispatchReply {
            envelope: Envelope::new(ProtectionMode::HpkeHandshake),
            body: outcome.response_body,
        })
    }

    async fn data(
        &self,
        envelope: &Envelope,
        body: &[u8],
    ) -> Result<DispatchReply, TransportError> {
        let session_id = envelope.session_id.as_deref().ok_or_else(|| {
            TransportError::SessionNotFound("<missing session id>".to_string())
        })?;

        let session = self
            .registry
            .find(session_id)
            .await
            .map_err(TransportError::Internal)?;

        match session {
            Some(session) => self.data_with_session(envelope, body, session).await,
            None => {
                // Late renegotiation: a peer that lost step may still be
                // sending a handshake payload under a stale session header.
                if let Some(negotiator) = &self.negotiator {
                    let context_id = envelope.context_id.as_deref().unwrap_or("");
                    if let Ok(outcome) = negotiator.respond(context_id, body).await {
                        let new_id = outcome.session.id.clone();
                        self.registry
                            .save(outcome.session)
                            .await
                            .map_err(TransportError::Internal)?;
                        info!(
                            stale_session_id = session_id,
                            session_id = %new_id,
                            "stale session renegotiated"
                        );
                        return Ok(DispatchReply {
                            envelope: Envelope::new(ProtectionMode::HpkeHandshake),
                            body: outcome.response_body,
                        });
                    }
                }
                warn!(session_id, "data request for unknown session");
                Err(TransportError::SessionNotFound(session_id.to_string()))
            }
        }
    }

    async fn data_with_session(
        &self,
        envelope: &Envelope,
        body: &[u8],
        session: SecureSession,
    ) -> Result<DispatchReply, TransportError> {
        // Crypto failures return here, before the handler can see them.
        let plaintext = session.crypto.decrypt(body)?;
        let message: TaskMessage =
            serde_json::from_slice(&plaintext).map_err(|e| {
                warn!(error = %e, session_id = %session.id, "decrypted payload is not a task message");
                TransportError::Crypto(crate::domain::error::CryptoError)
            })?;

        debug!(session_id = %session.id, message_id = %message.id, "dispatching decrypted task");
        let response = self
            .handler
            .handle(message, envelope)
            .await
            .map_err(TransportError::Handler)?;

        let response_bytes =
            serde_json::to_vec(&response).map_err(|e| TransportError::Internal(e.into()))?;
        let ciphertext = session.crypto.encrypt(&response_bytes)?;

        Ok(DispatchReply {
            envelope: Envelope::new(ProtectionMode::HpkeData).with_session(session.id.clone()),
            body: ciphertext,
        })
    }

    async fn plain(
        &self,
        envelope: &Envelope,
        body: &[u8],
    ) -> Result<DispatchReply, TransportError> {
        let message: TaskMessage =
            serde_json::from_slice(body).map_err(|_| TransportError::MalformedMessage)?;

        debug!(message_id = %message.id, mode = %envelope.mode, "dispatching task");
        let response = self
            .handler
            .handle(message, envelope)
            .await
            .map_err(TransportError::Handler)?;

        let body = serde_json::to_vec(&response).map_err(|e| TransportError::Internal(e.into()))?;
        Ok(DispatchReply {
            envelope: Envelope::new(ProtectionMode::Plain),
            body,
        })
    }
}

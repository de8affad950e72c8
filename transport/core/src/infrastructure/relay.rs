// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Outbound relay: plain, signed, or session-encrypting client for one hop.
//!
//! Two independent runtime flags select the behavior of [`OutboundRelay::send`]:
//!
//! | signed | encrypted | behavior |
//! |--------|-----------|----------|
//! | off    | off       | plain POST, digest attached, unsigned |
//! | on     | off       | plain POST with a detached signature |
//! | on     | on        | lazy handshake, then encrypted body under the session id |
//! | off    | on        | rejected as an invalid configuration |
//!
//! The signing identity is loaded lazily, once per process, under a lock; a
//! load failure degrades the relay to unsigned with a logged warning unless
//! signed mode was requested, in which case `send` fails fast. The first
//! handshake per target is likewise serialized per target, so concurrent
//! first senders trigger exactly one handshake.
//!
//! This layer never auto-retries an upstream failure; retry policy belongs
//! to the caller. The single exception is `session-not-found` from the peer,
//! which is a renegotiation trigger, not a failure: the relay drops its
//! cached session, re-handshakes, and resends once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::collaborators::{
    HandshakeInitiator, IdentityProvider, SigningIdentity, SigningService,
};
use crate::domain::envelope::{Envelope, ProtectionMode};
use crate::domain::error::{DenialReason, TransportError};
use crate::domain::message::TaskMessage;
use crate::domain::session::SecureSession;
use crate::infrastructure::codec::{self, HEADER_CONTENT_DIGEST};
use crate::infrastructure::digest;
use crate::infrastructure::signing::{attach_signature, build_signature_base, SignatureParams};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime protection flags for outbound hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    pub signed: bool,
    pub encrypted: bool,
}

impl RelayPolicy {
    pub const PLAIN: Self = Self {
        signed: false,
        encrypted: false,
    };

    /// Encrypted-without-signed is rejected at the boundary.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.encrypted && !self.signed {
            return Err(TransportError::Configuration(
                "encrypted mode requires signed mode".to_string(),
            ));
        }
        Ok(())
    }
}

enum IdentitySlot {
    Unloaded,
    Ready(Arc<SigningIdentity>),
    Failed,
}

type SessionSlot = Arc<tokio::sync::Mutex<Option<SecureSession>>>;

struct RelayResponse {
    headers: HeaderMap,
    body: Vec<u8>,
}

pub struct OutboundRelay {
    client: reqwest::Client,
    signer: Arc<dyn SigningService>,
    identity_provider: Arc<dyn IdentityProvider>,
    initiator: Option<Arc<dyn HandshakeInitiator>>,
    context_id: String,
    policy: RwLock<RelayPolicy>,
    identity: Mutex<IdentitySlot>,
    // One slot per target so unrelated targets never serialize each other.
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl OutboundRelay {
    pub fn new(
        signer: Arc<dyn SigningService>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            signer,
            identity_provider,
            initiator: None,
            context_id: Uuid::new_v4().to_string(),
            policy: RwLock::new(RelayPolicy::PLAIN),
            identity: Mutex::new(IdentitySlot::Unloaded),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_initiator(mut self, initiator: Arc<dyn HandshakeInitiator>) -> Self {
        self.initiator = Some(initiator);
        self
    }

    /// Pin the conversation context id instead of the generated one.
    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = context_id.into();
        self
    }

    pub fn policy(&self) -> RelayPolicy {
        *self.policy.read()
    }

    /// Flip the runtime flags. Takes effect on the next `send`.
    pub fn set_policy(&self, policy: RelayPolicy) {
        info!(signed = policy.signed, encrypted = policy.encrypted, "relay policy changed");
        *self.policy.write() = policy;
    }

    /// Lazy, lock-guarded identity load. `required` reflects signed mode:
    /// when set, a load failure is a hard configuration error; otherwise the
    /// relay degrades to unsigned.
    fn signing_identity(
        &self,
        required: bool,
    ) -> Result<Option<Arc<SigningIdentity>>, TransportError> {
        let mut slot = self.identity.lock();
        match &*slot {
            IdentitySlot::Ready(identity) => Ok(Some(identity.clone())),
            IdentitySlot::Failed => {
                if required {
                    Err(TransportError::Configuration(
                        "signing identity unavailable".to_string(),
                    ))
                } else {
                    Ok(None)
                }
            }
            IdentitySlot::Unloaded => match self.identity_provider.load() {
                Ok(identity) => {
                    let identity = Arc::new(identity);
                    info!(did = %identity.did, "signing identity loaded");
                    *slot = IdentitySlot::Ready(identity.clone());
                    Ok(Some(identity))
                }
                Err(e) => {
                    *slot = IdentitySlot::Failed;
                    if required {
                        Err(e)
                    } else {
                        warn!(error = %e, "signing identity unavailable, degrading to unsigned");
                        Ok(None)
                    }
                }
            },
        }
    }

    /// Send one task message to one peer endpoint under the current policy.
    pub async fn send(
        &self,
        message: &TaskMessage,
        target_url: &str,
    ) -> Result<TaskMessage, TransportError> {
        let policy = self.policy();
        policy.validate()?;

        let identity = self.signing_identity(policy.signed)?;
        let body = serde_json::to_vec(message)
            .map_err(|e| TransportError::Internal(e.into()))?;
        let envelope = self.envelope_for(message, identity.as_deref());

        if policy.encrypted {
            let identity = identity.ok_or_else(|| {
                TransportError::Configuration("encrypted mode requires a signing identity".to_string())
            })?;
            let session = self.session_for(target_url, &identity).await?;
            match self
                .send_encrypted(&body, target_url, &session, &identity, envelope.clone())
                .await
            {
                Err(TransportError::SessionNotFound(sid)) => {
                    debug!(session_id = %sid, "peer lost the session, renegotiating");
                    self.invalidate_session(target_url).await;
                    let session = self.session_for(target_url, &identity).await?;
                    self.send_encrypted(&body, target_url, &session, &identity, envelope)
                        .await
                }
                other => other,
            }
        } else {
            let sign_as = if policy.signed { identity.as_deref() } else { None };
            let mode = if sign_as.is_some() {
                ProtectionMode::Signed
            } else {
                ProtectionMode::Plain
            };
            let response = self
                .post(target_url, Envelope { mode, ..envelope }, body, sign_as)
                .await?;
            parse_task_message(&response.body)
        }
    }

    fn envelope_for(&self, message: &TaskMessage, identity: Option<&SigningIdentity>) -> Envelope {
        let mut envelope = Envelope::new(ProtectionMode::Plain)
            .with_message_id(message.id.clone())
            .with_context(self.context_id.clone());
        envelope.claimed_identity = Some(
            identity
                .map(|i| i.did.clone())
                .unwrap_or_else(|| message.from.clone()),
        );
        envelope.task_id = message.metadata.get("task_id").cloned();
        envelope.scenario = message.metadata.get("scenario").cloned();
        envelope
    }

    async fn send_encrypted(
        &self,
        plain_body: &[u8],
        target_url: &str,
        session: &SecureSession,
        identity: &SigningIdentity,
        envelope: Envelope,
    ) -> Result<TaskMessage, TransportError> {
        let ciphertext = session.crypto.encrypt(plain_body)?;
        let envelope = Envelope {
            mode: ProtectionMode::HpkeData,
            session_id: Some(session.id.clone()),
            ..envelope
        };
        // The signature covers the encrypted envelope, not the plaintext.
        let response = self
            .post(target_url, envelope, ciphertext, Some(identity))
            .await?;

        let reply_envelope = codec::decode(&response.headers);
        let plaintext = if reply_envelope.mode == ProtectionMode::HpkeData {
            session.crypto.decrypt(&response.body)?
        } else {
            response.body
        };
        parse_task_message(&plaintext)
    }

    /// Resolve or lazily negotiate the session for a target. The per-target
    /// mutex is held across the handshake so rapid concurrent first callers
    /// negotiate once.
    async fn session_for(
        &self,
        target_url: &str,
        identity: &Arc<SigningIdentity>,
    ) -> Result<SecureSession, TransportError> {
        let slot = {
            let mut sessions = self.sessions.lock();
            sessions.entry(target_url.to_string()).or_default().clone()
        };
        let mut guard = slot.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.handshake(target_url, identity).await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn invalidate_session(&self, target_url: &str) {
        let slot = {
            let sessions = self.sessions.lock();
            sessions.get(target_url).cloned()
        };
        if let Some(slot) = slot {
            slot.lock().await.take();
        }
    }

    async fn handshake(
        &self,
        target_url: &str,
        identity: &Arc<SigningIdentity>,
    ) -> Result<SecureSession, TransportError> {
        let initiator = self.initiator.as_ref().ok_or_else(|| {
            TransportError::Configuration("no handshake initiator configured".to_string())
        })?;
        let (body, pending) = initiator.initiate(&self.context_id, target_url).await?;

        let envelope = Envelope::new(ProtectionMode::HpkeHandshake)
            .with_identity(identity.did.clone())
            .with_context(self.context_id.clone());
        let response = self
            .post(target_url, envelope, body, Some(identity.as_ref()))
            .await?;

        let session = pending.complete(&response.body)?;
        info!(session_id = %session.id, target_url, "session negotiated");
        Ok(session)
    }

    /// Shared POST path: envelope headers, digest, optional signature,
    /// bounded timeout, status mapping, response digest check.
    async fn post(
        &self,
        target_url: &str,
        envelope: Envelope,
        body: Vec<u8>,
        sign_as: Option<&SigningIdentity>,
    ) -> Result<RelayResponse, TransportError> {
        let mut headers = codec::encode(&envelope)?;
        let digest_value = digest::compute(&body);
        headers.insert(
            HEADER_CONTENT_DIGEST,
            HeaderValue::from_str(&digest_value)
                .map_err(|e| TransportError::Internal(e.into()))?,
        );

        if let Some(identity) = sign_as {
            let params = SignatureParams::new(identity.key_id.clone());
            let path = request_path(target_url)?;
            let base = build_signature_base(&params, "POST", &path, &headers)
                .map_err(|r| TransportError::Internal(anyhow::anyhow!("unsignable request: {r}")))?;
            let signature = self.signer.sign(base.as_bytes(), identity)?;
            attach_signature(&mut headers, &params, &signature);
        }

        let response = self
            .client
            .post(target_url)
            .timeout(REQUEST_TIMEOUT)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Upstream(e.to_string()))?;

        let status = response.status();
        let resp_headers = response.headers().clone();
        let resp_body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Upstream(e.to_string()))?
            .to_vec();

        if !status.is_success() {
            let reason = wire_error_code(&resp_body);
            if status.as_u16() == 404 && reason == "session-not-found" {
                let sid = envelope.session_id.unwrap_or_default();
                return Err(TransportError::SessionNotFound(sid));
            }
            return Err(TransportError::UpstreamStatus {
                status: status.as_u16(),
                reason,
            });
        }

        match codec::header_str(&resp_headers, HEADER_CONTENT_DIGEST) {
            Some(value) => digest::verify(&value, &resp_body).map_err(TransportError::Integrity)?,
            None => return Err(TransportError::Integrity(DenialReason::DigestMissing)),
        }

        Ok(RelayResponse {
            headers: resp_headers,
            body: resp_body,
        })
    }
}

fn parse_task_message(body: &[u8]) -> Result<TaskMessage, TransportError> {
    serde_json::from_slice(body).map_err(|_| TransportError::MalformedMessage)
}

fn request_path(target_url: &str) -> Result<String, TransportError> {
    let url = reqwest::Url::parse(target_url)
        .map_err(|e| TransportError::Configuration(format!("invalid target url: {e}")))?;
    Ok(url.path().to_string())
}

fn wire_error_code(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_default()
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Verification Gate: inbound digest and signature validation.
//!
//! The gate runs on every inbound request before the dispatcher. It checks
//! the content digest over the exact received bytes, extracts the detached
//! signature and the claimed identity, resolves the identity's public key,
//! and verifies the signature over the configured component set.
//!
//! ## Modes
//!
//! - **Required**: any failed check denies the request with its
//!   [`DenialReason`] code.
//! - **Optional**: the same checks run and are reported, but a failure
//!   passes the request through *unauthenticated*: no verified identity is
//!   attached, and the undefended baseline is observable end to end.
//!
//! The mode is runtime-toggleable through [`VerificationGate::set_mode`],
//! without a process restart, to support live on/off demonstrations.

use std::sync::Arc;

use axum::http::HeaderMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::domain::collaborators::{KeyResolver, KeyType, SigningService};
use crate::domain::error::{DenialReason, TransportError};
use crate::infrastructure::codec::{header_str, HEADER_CONTENT_DIGEST, HEADER_IDENTITY};
use crate::infrastructure::digest;
use crate::infrastructure::signing::{build_signature_base, extract_signature};

/// Enforcement mode of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Reject on missing or invalid signature.
    Required,
    /// Attach the verified identity when valid; otherwise pass through
    /// unauthenticated.
    Optional,
}

/// Identity confirmed by a valid signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub did: String,
    pub key_id: String,
}

/// Pluggable sink for denial events (metrics, audit, demo output).
pub trait DenialReporter: Send + Sync {
    fn report(&self, reason: DenialReason, claimed_identity: Option<&str>);
}

/// Default reporter: structured warning log.
pub struct LogDenialReporter;

impl DenialReporter for LogDenialReporter {
    fn report(&self, reason: DenialReason, claimed_identity: Option<&str>) {
        warn!(
            code = reason.code(),
            identity = claimed_identity.unwrap_or("<none>"),
            "request verification failed"
        );
    }
}

pub struct VerificationGate {
    resolver: Arc<dyn KeyResolver>,
    signer: Arc<dyn SigningService>,
    reporter: Arc<dyn DenialReporter>,
    mode: RwLock<VerificationMode>,
}

impl VerificationGate {
    pub fn new(resolver: Arc<dyn KeyResolver>, signer: Arc<dyn SigningService>) -> Self {
        Self {
            resolver,
            signer,
            reporter: Arc::new(LogDenialReporter),
            mode: RwLock::new(VerificationMode::Required),
        }
    }

    pub fn with_mode(self, mode: VerificationMode) -> Self {
        *self.mode.write() = mode;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn DenialReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn mode(&self) -> VerificationMode {
        *self.mode.read()
    }

    /// Guarded setter for the runtime toggle. The only way to change the
    /// enforcement mode.
    pub fn set_mode(&self, mode: VerificationMode) {
        info!(?mode, "verification mode changed");
        *self.mode.write() = mode;
    }

    /// Validate one inbound request.
    ///
    /// Returns the verified identity on full success, `None` when Optional
    /// mode passed an unverifiable request through.
    ///
    /// # Errors
    ///
    /// In Required mode: [`TransportError::Integrity`] for digest failures,
    /// [`TransportError::Authentication`] for signature failures. The
    /// handler behind the gate is never reached on an error.
    pub async fn verify_request(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<VerifiedIdentity>, TransportError> {
        let claimed = header_str(headers, HEADER_IDENTITY);
        match self.check(method, path, headers, body).await {
            Ok(identity) => Ok(Some(identity)),
            Err(reason) => {
                self.reporter.report(reason, claimed.as_deref());
                match self.mode() {
                    VerificationMode::Required if reason.is_integrity() => {
                        Err(TransportError::Integrity(reason))
                    }
                    VerificationMode::Required => Err(TransportError::Authentication(reason)),
                    VerificationMode::Optional => Ok(None),
                }
            }
        }
    }

    /// The ordered check pipeline. First failure wins; each failure keeps
    /// its own code so digest mismatch and missing signature stay distinct
    /// diagnostics.
    async fn check(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<VerifiedIdentity, DenialReason> {
        // Digest guard: independent of signature presence.
        let digest_header =
            header_str(headers, HEADER_CONTENT_DIGEST).ok_or(DenialReason::DigestMissing)?;
        digest::verify(&digest_header, body)?;

        let (params, signature) =
            extract_signature(headers)?.ok_or(DenialReason::SignatureMissing)?;
        if !params.covers_required() {
            return Err(DenialReason::SignatureMalformed);
        }

        let claimed = header_str(headers, HEADER_IDENTITY).ok_or(DenialReason::UnknownIdentity)?;
        let public_key = self
            .resolver
            .resolve_public_key(&claimed, KeyType::Signing)
            .await
            .map_err(|e| {
                warn!(error = %e, identity = %claimed, "key resolution failed");
                DenialReason::UnknownIdentity
            })?
            .ok_or(DenialReason::UnknownIdentity)?;

        let base = build_signature_base(&params, method, path, headers)?;
        self.signer
            .verify(base.as_bytes(), &signature, &public_key)
            .map_err(|e| e.denial().unwrap_or(DenialReason::SignatureInvalid))?;

        Ok(VerifiedIdentity {
            did: claimed,
            key_id: params.key_id,
        })
    }
}

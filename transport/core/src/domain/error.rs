// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Transport error taxonomy.
//!
//! The taxonomy is deliberately asymmetric between what is logged server-side
//! and what crosses the wire: integrity and authentication failures carry a
//! machine-readable [`DenialReason`] code but no byte-level detail, and a
//! [`CryptoError`] is indistinguishable from a business-handler failure once
//! it leaves the process. See `presentation::api` for the wire mapping.

use thiserror::Error;

/// Single generic error for every encrypt/decrypt/handshake failure.
///
/// Carries no detail on purpose: a caller that can distinguish "bad tag"
/// from "bad padding" from "bad key" has a decryption oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("crypto operation failed")]
pub struct CryptoError;

/// Machine-readable denial codes for integrity and authentication failures.
///
/// Digest mismatch and missing signature both deny a request in Required
/// mode, but they are distinct codes: the first means the bytes changed in
/// transit, the second that the sender never protected them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// No `content-digest` header on the request.
    DigestMissing,
    /// The `content-digest` header does not match the received bytes.
    DigestMismatch,
    /// No `signature` / `signature-input` header pair on the request.
    SignatureMissing,
    /// Signature headers present but unparseable, or the covered component
    /// set does not include the configured components.
    SignatureMalformed,
    /// The signature did not verify against the resolved public key.
    SignatureInvalid,
    /// The claimed identity could not be resolved to a public key.
    UnknownIdentity,
}

impl DenialReason {
    /// Terse wire-level code. Machine-readable, non-diagnostic.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DigestMissing => "digest-missing",
            Self::DigestMismatch => "digest-mismatch",
            Self::SignatureMissing => "signature-missing",
            Self::SignatureMalformed => "signature-malformed",
            Self::SignatureInvalid => "signature-invalid",
            Self::UnknownIdentity => "unknown-identity",
        }
    }

    /// True for the codes produced by the Digest Guard rather than the
    /// signature path.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::DigestMissing | Self::DigestMismatch)
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Missing key material or an invalid flag combination. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Digest guard rejected the request bytes.
    #[error("integrity violation: {0}")]
    Integrity(DenialReason),

    /// Signature missing, malformed, or invalid.
    #[error("authentication failed: {0}")]
    Authentication(DenialReason),

    /// Encrypt/decrypt/handshake failure. Surfaced outward as a generic
    /// application error, indistinguishable from a handler failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Session id present but not resolvable in the registry. A caller with
    /// a negotiator treats this as a renegotiation trigger.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The request body could not be parsed as a task message.
    #[error("malformed task message")]
    MalformedMessage,

    /// Next hop unreachable. Retry policy belongs to the caller.
    #[error("upstream unreachable: {0}")]
    Upstream(String),

    /// Next hop answered with a non-success status.
    #[error("upstream returned status {status}: {reason}")]
    UpstreamStatus { status: u16, reason: String },

    /// The business handler failed.
    #[error("handler error: {0}")]
    Handler(anyhow::Error),

    /// Internal invariant failure (registry I/O, serialization of our own
    /// types). Surfaced outward as a generic application error.
    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl TransportError {
    /// The denial code, when this error carries one.
    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Self::Integrity(r) | Self::Authentication(r) => Some(*r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_codes_are_distinct() {
        let codes = [
            DenialReason::DigestMissing,
            DenialReason::DigestMismatch,
            DenialReason::SignatureMissing,
            DenialReason::SignatureMalformed,
            DenialReason::SignatureInvalid,
            DenialReason::UnknownIdentity,
        ];
        let mut seen = std::collections::HashSet::new();
        for code in codes {
            assert!(seen.insert(code.code()));
        }
    }

    #[test]
    fn test_crypto_error_carries_no_detail() {
        assert_eq!(CryptoError.to_string(), "crypto operation failed");
    }

    #[test]
    fn test_digest_codes_flagged_as_integrity() {
        assert!(DenialReason::DigestMismatch.is_integrity());
        assert!(DenialReason::DigestMissing.is_integrity());
        assert!(!DenialReason::SignatureMissing.is_integrity());
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Collaborator ports consumed by the transport core.
//!
//! These traits keep the domain free of `ed25519-dalek`, `x25519-dalek`, and
//! registry technology choices (Anti-Corruption Layer). The default
//! implementations live in `infrastructure`; any external registry, HSM, or
//! alternative cipher suite can attach at these seams without touching the
//! gate, dispatcher, or relay.

use anyhow::Result;
use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::envelope::Envelope;
use crate::domain::error::{CryptoError, TransportError};
use crate::domain::message::TaskMessage;
use crate::domain::session::SecureSession;

/// Which of an identity's published keys to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Ed25519 verification key for detached signatures.
    Signing,
    /// X25519 key-agreement key (reserved for static-key handshake modes).
    KeyAgreement,
}

/// Local signing identity: key material plus the identity string derived
/// from it. Loaded once per process by an [`IdentityProvider`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningIdentity {
    /// DID this key speaks for.
    #[zeroize(skip)]
    pub did: String,
    /// Key id carried in the signature parameters.
    #[zeroize(skip)]
    pub key_id: String,
    secret: Vec<u8>,
}

impl SigningIdentity {
    pub fn new(did: impl Into<String>, key_id: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            did: did.into(),
            key_id: key_id.into(),
            secret,
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("did", &self.did)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Detached-signature primitive.
pub trait SigningService: Send + Sync {
    /// Sign the signature base with the local identity's key.
    ///
    /// # Errors
    ///
    /// [`TransportError::Configuration`] when the key material is unusable.
    fn sign(&self, base: &[u8], identity: &SigningIdentity) -> Result<Vec<u8>, TransportError>;

    /// Verify a detached signature against a resolved public key.
    ///
    /// # Errors
    ///
    /// [`TransportError::Authentication`] when the signature does not verify.
    fn verify(&self, base: &[u8], signature: &[u8], public_key: &[u8])
        -> Result<(), TransportError>;
}

/// Resolution of a claimed identity to its published public key.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// `Ok(None)` means the identity is unknown; callers map that to their
    /// own denial code rather than an error.
    async fn resolve_public_key(
        &self,
        identity: &str,
        key_type: KeyType,
    ) -> Result<Option<Vec<u8>>>;
}

/// Successful responder-side handshake: the session to register plus the
/// opaque payload to return to the initiator.
#[derive(Debug)]
pub struct NegotiatedSession {
    pub session: SecureSession,
    pub response_body: Vec<u8>,
}

/// Responder side of the session handshake.
#[async_trait]
pub trait HandshakeNegotiator: Send + Sync {
    /// Consume the whole handshake payload and produce a fresh session.
    ///
    /// # Errors
    ///
    /// Any failure is the generic [`CryptoError`]; malformed payload and
    /// failed key agreement are indistinguishable to the peer.
    async fn respond(&self, context_id: &str, body: &[u8])
        -> Result<NegotiatedSession, CryptoError>;
}

/// In-flight initiator-side handshake, completed by the peer's response.
pub trait PendingHandshake: Send {
    fn complete(self: Box<Self>, response_body: &[u8]) -> Result<SecureSession, CryptoError>;
}

/// Initiator side of the session handshake.
#[async_trait]
pub trait HandshakeInitiator: Send + Sync {
    /// Produce the handshake payload for `remote_identity` and the pending
    /// state that turns the peer's response into a [`SecureSession`].
    async fn initiate(
        &self,
        context_id: &str,
        remote_identity: &str,
    ) -> Result<(Vec<u8>, Box<dyn PendingHandshake>), CryptoError>;
}

/// Business handler invoked with the decoded message and the forwarded
/// envelope metadata. Opaque to the transport; may itself forward to a
/// further hop.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, message: TaskMessage, envelope: &Envelope) -> Result<TaskMessage>;
}

/// Source of the local signing identity (key file, env, vault; out of this
/// crate's scope). Invoked lazily, at most once per process.
pub trait IdentityProvider: Send + Sync {
    /// # Errors
    ///
    /// [`TransportError::Configuration`] when key material is missing or
    /// unusable. The relay degrades to unsigned on this unless signing was
    /// explicitly requested.
    fn load(&self) -> Result<SigningIdentity, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_identity_debug_hides_secret() {
        let identity = SigningIdentity::new("did:aegis:a", "key-1", vec![7u8; 32]);
        let rendered = format!("{identity:?}");
        assert!(rendered.contains("did:aegis:a"));
        assert!(!rendered.contains('7'));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Default session-encryption suite: X25519 + HKDF-SHA256 + ChaCha20-Poly1305.
//!
//! Ephemeral-ephemeral key agreement in the HPKE spirit: the initiator sends
//! a fresh X25519 public key, the responder answers with its own plus the
//! new session id, and both sides derive the session key by HKDF over the
//! shared secret with the context id and both public keys bound into the
//! info string.
//!
//! ## Wire format
//!
//! ```text
//! request:  {"suite":"x25519-hkdf-sha256-chacha20poly1305","epk":"<b64>"}
//! response: {"session_id":"<uuid>","epk":"<b64>"}
//! ```
//!
//! Ciphertext framing is `nonce(12) || aead_ciphertext`; nonces are random
//! per message, so concurrent encrypt calls on one session need no ordering.
//!
//! ## Security
//!
//! Every failure path collapses into the generic [`CryptoError`] before it
//! leaves this module. Details go to the server-side log only.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::collaborators::{
    HandshakeInitiator, HandshakeNegotiator, NegotiatedSession, PendingHandshake,
};
use crate::domain::error::CryptoError;
use crate::domain::session::{SecureSession, SessionCrypto};

/// Suite identifier carried in the handshake request.
pub const SUITE_ID: &str = "x25519-hkdf-sha256-chacha20poly1305";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HKDF_INFO_PREFIX: &str = "aegis-a2a-hpke-v1";

#[derive(Serialize, Deserialize)]
struct HandshakeRequest {
    suite: String,
    epk: String,
}

#[derive(Serialize, Deserialize)]
struct HandshakeReply {
    session_id: String,
    epk: String,
}

/// Derived 256-bit session key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SessionKey([u8; 32]);

/// ChaCha20-Poly1305 session state with random-nonce framing.
pub struct ChaChaSessionCrypto {
    key: SessionKey,
}

impl ChaChaSessionCrypto {
    fn new(key: SessionKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key.0))
    }
}

impl SessionCrypto for ChaChaSessionCrypto {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError)?;

        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&ciphertext);
        Ok(framed)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError);
        }
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CryptoError)
    }
}

fn decode_public_key(encoded: &str) -> Result<PublicKey, CryptoError> {
    let bytes = STANDARD.decode(encoded).map_err(|_| CryptoError)?;
    let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| CryptoError)?;
    Ok(PublicKey::from(array))
}

/// HKDF over the DH output, binding context id and both ephemeral keys so a
/// transplanted handshake transcript derives a different key.
fn derive_key(
    shared: &[u8],
    context_id: &str,
    initiator_epk: &str,
    responder_epk: &str,
) -> Result<SessionKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let info = format!("{HKDF_INFO_PREFIX}|{context_id}|{initiator_epk}|{responder_epk}");
    let mut okm = [0u8; 32];
    hk.expand(info.as_bytes(), &mut okm).map_err(|_| CryptoError)?;
    Ok(SessionKey(okm))
}

/// Default suite implementing both handshake sides.
pub struct EphemeralHpkeSuite;

impl EphemeralHpkeSuite {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EphemeralHpkeSuite {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HandshakeNegotiator for EphemeralHpkeSuite {
    async fn respond(
        &self,
        context_id: &str,
        body: &[u8],
    ) -> Result<NegotiatedSession, CryptoError> {
        let request: HandshakeRequest = serde_json::from_slice(body).map_err(|e| {
            warn!(error = %e, "handshake payload unparseable");
            CryptoError
        })?;
        if request.suite != SUITE_ID {
            warn!(suite = %request.suite, "unsupported handshake suite");
            return Err(CryptoError);
        }

        let initiator_pk = decode_public_key(&request.epk)?;
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let responder_pk = PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&initiator_pk);
        if !shared.was_contributory() {
            warn!("rejecting non-contributory handshake key");
            return Err(CryptoError);
        }

        let responder_epk = STANDARD.encode(responder_pk.as_bytes());
        let key = derive_key(shared.as_bytes(), context_id, &request.epk, &responder_epk)?;

        let session_id = Uuid::new_v4().to_string();
        debug!(session_id = %session_id, context_id, "handshake accepted");
        let reply = HandshakeReply {
            session_id: session_id.clone(),
            epk: responder_epk,
        };
        let response_body = serde_json::to_vec(&reply).map_err(|_| CryptoError)?;

        Ok(NegotiatedSession {
            session: SecureSession::new(session_id, Arc::new(ChaChaSessionCrypto::new(key))),
            response_body,
        })
    }
}

struct PendingExchange {
    context_id: String,
    secret: EphemeralSecret,
    epk: String,
}

impl PendingHandshake for PendingExchange {
    fn complete(self: Box<Self>, response_body: &[u8]) -> Result<SecureSession, CryptoError> {
        let reply: HandshakeReply = serde_json::from_slice(response_body).map_err(|e| {
            warn!(error = %e, "handshake reply unparseable");
            CryptoError
        })?;
        let responder_pk = decode_public_key(&reply.epk)?;
        let shared = self.secret.diffie_hellman(&responder_pk);
        if !shared.was_contributory() {
            warn!("rejecting non-contributory handshake reply");
            return Err(CryptoError);
        }
        let key = derive_key(shared.as_bytes(), &self.context_id, &self.epk, &reply.epk)?;
        Ok(SecureSession::new(
            reply.session_id,
            Arc::new(ChaChaSessionCrypto::new(key)),
        ))
    }
}

#[async_trait]
impl HandshakeInitiator for EphemeralHpkeSuite {
    async fn initiate(
        &self,
        context_id: &str,
        remote_identity: &str,
    ) -> Result<(Vec<u8>, Box<dyn PendingHandshake>), CryptoError> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let epk = STANDARD.encode(PublicKey::from(&secret).as_bytes());
        debug!(remote_identity, context_id, "initiating handshake");

        let request = HandshakeRequest {
            suite: SUITE_ID.to_string(),
            epk: epk.clone(),
        };
        let body = serde_json::to_vec(&request).map_err(|_| CryptoError)?;

        Ok((
            body,
            Box::new(PendingExchange {
                context_id: context_id.to_string(),
                secret,
                epk,
            }),
        ))
    }
}

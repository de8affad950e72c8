// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Negotiated encryption session.
//!
//! A session is created exactly once per successful handshake and reused for
//! every subsequent `hpke-data` envelope until a re-handshake produces a new
//! session id. The session id itself is opaque to this layer: the negotiator
//! guarantees global uniqueness, and a collision is a protocol violation
//! this layer does not resolve.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::error::CryptoError;

/// Symmetric crypto capability of one negotiated session.
///
/// Implementations must be safe for concurrent callers; the dispatcher does
/// not serialize encrypt/decrypt per session. Both operations fail with the
/// single generic [`CryptoError`]; implementations must not leak which step
/// failed.
pub trait SessionCrypto: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// One negotiated session: opaque id, encryption state, creation time.
///
/// Exclusively owned by the Session Registry. Cloning shares the underlying
/// crypto state.
#[derive(Clone)]
pub struct SecureSession {
    pub id: String,
    pub crypto: Arc<dyn SessionCrypto>,
    pub created_at: DateTime<Utc>,
}

impl SecureSession {
    pub fn new(id: impl Into<String>, crypto: Arc<dyn SessionCrypto>) -> Self {
        Self {
            id: id.into(),
            crypto,
            created_at: Utc::now(),
        }
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

impl std::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory session registry.
//!
//! Backed by a sharded concurrent map so unrelated sessions never contend on
//! one lock. Expiry policy: fixed TTL from creation, applied on lookup: an
//! expired session behaves exactly like an absent one, which feeds the
//! renegotiation path.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::domain::registry::SessionRegistry;
use crate::domain::session::SecureSession;

/// Default session lifetime.
const SESSION_TTL_SECS: i64 = 3600;

pub struct InMemorySessionRegistry {
    sessions: DashMap<String, SecureSession>,
    ttl: Duration,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(SESSION_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session. Demo/admin reset; peers renegotiate on their
    /// next data call.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl Default for InMemorySessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn save(&self, session: SecureSession) -> Result<()> {
        info!(session_id = %session.id, "session registered");
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<SecureSession>> {
        let expired = match self.sessions.get(session_id) {
            Some(entry) => {
                if entry.value().age() <= self.ttl {
                    return Ok(Some(entry.value().clone()));
                }
                true
            }
            None => false,
        };
        if expired {
            self.sessions.remove(session_id);
            debug!(session_id, "session expired, evicted");
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::CryptoError;
    use crate::domain::session::SessionCrypto;
    use std::sync::Arc;

    struct NullCrypto;
    impl SessionCrypto for NullCrypto {
        fn encrypt(&self, p: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(p.to_vec())
        }
        fn decrypt(&self, c: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(c.to_vec())
        }
    }

    fn session(id: &str) -> SecureSession {
        SecureSession::new(id, Arc::new(NullCrypto))
    }

    #[tokio::test]
    async fn test_save_then_find() {
        let registry = InMemorySessionRegistry::new();
        registry.save(session("s-1")).await.unwrap();
        assert!(registry.find("s-1").await.unwrap().is_some());
        assert!(registry.find("s-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_behaves_like_absent() {
        let registry = InMemorySessionRegistry::with_ttl(Duration::seconds(-1));
        registry.save(session("s-1")).await.unwrap();
        assert!(registry.find("s-1").await.unwrap().is_none());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_rehandshake_replaces_nothing_new_id() {
        let registry = InMemorySessionRegistry::new();
        registry.save(session("s-1")).await.unwrap();
        registry.save(session("s-2")).await.unwrap();
        // Old session stays valid until it expires; both ids resolve.
        assert!(registry.find("s-1").await.unwrap().is_some());
        assert!(registry.find("s-2").await.unwrap().is_some());
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session registry port.
//!
//! Globally shared session state is modeled as an injected concurrency-safe
//! store passed explicitly into the dispatcher's constructor, never a hidden
//! singleton. The in-memory implementation lives in
//! `infrastructure::session_registry`.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::session::SecureSession;

/// Concurrency-safe store of negotiated sessions keyed by session id.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Commit a session. Called only after the handshake negotiator fully
    /// succeeded; a cancelled handshake must never leave a half-registered
    /// session behind.
    async fn save(&self, session: SecureSession) -> Result<()>;

    /// Look up a live session. Implementations apply their expiry policy
    /// here: an expired session behaves exactly like an absent one.
    async fn find(&self, session_id: &str) -> Result<Option<SecureSession>>;
}

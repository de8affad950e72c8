// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Transport envelope: the mode and metadata a request carries in headers.
//!
//! There is no framed wire envelope; the envelope is reconstructed from ad
//! hoc header conventions by `infrastructure::codec::classify_mode`, which is
//! the single place that rule lives.
//!
//! ## Invariants
//!
//! - `session_id` is present **if and only if** `mode == HpkeData`
//!   ([`Envelope::validate`]).
//! - `verified_identity` is never taken from headers; it is attached by the
//!   Verification Gate after a signature verifies, and is absent otherwise.

use crate::domain::error::TransportError;

/// Protection level of a single request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMode {
    /// Unauthenticated JSON body. Inbound classification cannot tell plain
    /// from signed; that distinction belongs to the Verification Gate.
    Plain,
    /// JSON body with a detached signature over the header components.
    Signed,
    /// Opaque handshake payload establishing an encrypted session.
    HpkeHandshake,
    /// Session-encrypted body under a previously negotiated session id.
    HpkeData,
}

impl ProtectionMode {
    pub fn is_hpke(&self) -> bool {
        matches!(self, Self::HpkeHandshake | Self::HpkeData)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Signed => "signed",
            Self::HpkeHandshake => "hpke-handshake",
            Self::HpkeData => "hpke-data",
        }
    }
}

impl std::fmt::Display for ProtectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport wrapper reconstructed from (or rendered into) request headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sender identity as claimed in the `x-a2a-identity` header. Untrusted
    /// until the Verification Gate confirms it.
    pub claimed_identity: Option<String>,
    pub message_id: Option<String>,
    pub context_id: Option<String>,
    pub task_id: Option<String>,
    /// Free-form scenario hint, forwarded as non-security metadata.
    pub scenario: Option<String>,
    pub mode: ProtectionMode,
    /// Session correlation token. Present iff `mode == HpkeData`.
    pub session_id: Option<String>,
    /// Identity confirmed by the Verification Gate, if any. Request-scoped;
    /// never serialized back into headers.
    pub verified_identity: Option<String>,
}

impl Envelope {
    pub fn new(mode: ProtectionMode) -> Self {
        Self {
            claimed_identity: None,
            message_id: None,
            context_id: None,
            task_id: None,
            scenario: None,
            mode,
            session_id: None,
            verified_identity: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.claimed_identity = Some(identity.into());
        self
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Enforce the mode/session coupling.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] when a session id is present
    /// without data mode, or data mode is claimed without a session id.
    pub fn validate(&self) -> Result<(), TransportError> {
        match (self.mode, self.session_id.is_some()) {
            (ProtectionMode::HpkeData, true) => Ok(()),
            (ProtectionMode::HpkeData, false) => Err(TransportError::Configuration(
                "hpke-data envelope without a session id".to_string(),
            )),
            (mode, true) => Err(TransportError::Configuration(format!(
                "session id present on a {mode} envelope"
            ))),
            (_, false) => Ok(()),
        }
    }
}

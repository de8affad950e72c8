// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod collaborators;
pub mod config;
pub mod envelope;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;

pub use collaborators::{
    HandshakeInitiator, HandshakeNegotiator, IdentityProvider, KeyResolver, KeyType,
    NegotiatedSession, PendingHandshake, SigningIdentity, SigningService, TaskHandler,
};
pub use config::{AgentConfig, PeerEntry};
pub use envelope::{Envelope, ProtectionMode};
pub use error::{CryptoError, DenialReason, TransportError};
pub use message::TaskMessage;
pub use registry::SessionRegistry;
pub use session::{SecureSession, SessionCrypto};

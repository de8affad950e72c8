// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod codec;
pub mod crypto;
pub mod digest;
pub mod relay;
pub mod resolver;
pub mod session_registry;
pub mod signing;

pub use crypto::EphemeralHpkeSuite;
pub use relay::{OutboundRelay, RelayPolicy};
pub use resolver::InMemoryKeyResolver;
pub use session_registry::InMemorySessionRegistry;
pub use signing::Ed25519SigningService;

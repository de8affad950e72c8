// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AEGIS A2A Transport Core
//!
//! Secure-transport dispatch layer for agent-to-agent task messages over
//! plain HTTP, under three alternative trust levels: unauthenticated,
//! signature-authenticated, and session-encrypted.
//!
//! # Architecture
//!
//! - **domain**: message/envelope/session model, error taxonomy, and the
//!   collaborator traits that keep cryptographic and registry technology
//!   choices out of the core (Anti-Corruption Layer).
//! - **application**: the Verification Gate and the Session Dispatcher.
//! - **infrastructure**: header codec, digest guard, Ed25519 signing,
//!   in-memory key resolution, the HPKE-style session suite, the session
//!   registry, and the outbound relay.
//! - **presentation**: the thin axum surface: one POST endpoint per agent
//!   plus a status probe.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;

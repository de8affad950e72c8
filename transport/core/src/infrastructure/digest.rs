// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Digest guard: content-hash header computation and verification.
//!
//! The digest is computed over the exact bytes that cross the wire and is
//! checked independently of signature presence, so it detects in-transit
//! mutation even on unsigned traffic. Header form follows the structured
//! `sha-256=:<base64>:` convention.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::error::DenialReason;

/// Compute the `content-digest` header value for a body.
pub fn compute(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    format!("sha-256=:{}:", STANDARD.encode(hash))
}

/// Verify a received `content-digest` header against the received bytes.
///
/// A pure equality check against a freshly computed digest, constant-time on
/// the comparison itself.
///
/// # Errors
///
/// [`DenialReason::DigestMismatch`] when the header does not match.
pub fn verify(header_value: &str, bytes: &[u8]) -> Result<(), DenialReason> {
    let expected = compute(bytes);
    if bool::from(expected.as_bytes().ct_eq(header_value.trim().as_bytes())) {
        Ok(())
    } else {
        Err(DenialReason::DigestMismatch)
    }
}

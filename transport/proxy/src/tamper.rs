// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mode-aware payload corruption.
//!
//! The proxy classifies traffic with the same header rule as the envelope
//! codec (it never needs to parse signatures) and then corrupts strictly
//! inside the payload. Cryptographic headers (signature, digest, session id)
//! are never touched: the point is that the headers stay "honest" while the
//! bytes lie, which is exactly what the downstream guards must catch.
//!
//! Per classification:
//!
//! - **Handshake**: never tampered. Corrupting a handshake aborts session
//!   establishment instead of demonstrating a per-message attack.
//! - **Encrypted data**: flip one bit of ciphertext byte 0, the blind
//!   on-path attacker. Deterministically fails authenticated decryption.
//! - **Plain task message**: append the attacker marker to `content` and
//!   re-serialize, the visible content-injection attack.
//! - **Anything else**: append one byte, still enough to invalidate any
//!   digest or signature.

use aegis_a2a_core::domain::envelope::ProtectionMode;
use aegis_a2a_core::domain::message::TaskMessage;
use aegis_a2a_core::infrastructure::codec::classify_mode;
use axum::http::HeaderMap;
use bytes::Bytes;

/// Which corruption the proxy injects, when any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TamperMode {
    /// Pass everything through untouched.
    #[default]
    Off,
    /// Blind attacker: flip a ciphertext bit on encrypted data traffic.
    FlipCiphertext,
    /// Content injection on unencrypted traffic.
    MutatePlaintext,
}

/// Adversary harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TamperPolicy {
    pub mode: TamperMode,
    /// Marker appended to plaintext content so the injection is visible in
    /// demo output.
    pub marker: String,
}

impl Default for TamperPolicy {
    fn default() -> Self {
        Self {
            mode: TamperMode::Off,
            marker: " [tampered-by-proxy]".to_string(),
        }
    }
}

impl TamperPolicy {
    pub fn off() -> Self {
        Self::default()
    }

    pub fn flip_ciphertext() -> Self {
        Self {
            mode: TamperMode::FlipCiphertext,
            ..Self::default()
        }
    }

    pub fn mutate_plaintext() -> Self {
        Self {
            mode: TamperMode::MutatePlaintext,
            ..Self::default()
        }
    }
}

/// What [`inject`] did to a request, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TamperAction {
    Untouched,
    FlippedCiphertextBit,
    MutatedContent,
    AppendedByte,
}

impl TamperAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untouched => "untouched",
            Self::FlippedCiphertextBit => "flipped-ciphertext-bit",
            Self::MutatedContent => "mutated-content",
            Self::AppendedByte => "appended-byte",
        }
    }
}

/// Apply the policy to one request body. Headers are read for
/// classification only and never modified.
pub fn inject(headers: &HeaderMap, body: Bytes, policy: &TamperPolicy) -> (Bytes, TamperAction) {
    if policy.mode == TamperMode::Off {
        return (body, TamperAction::Untouched);
    }

    match classify_mode(headers) {
        // Never corrupt session establishment.
        ProtectionMode::HpkeHandshake => (body, TamperAction::Untouched),

        ProtectionMode::HpkeData => match policy.mode {
            TamperMode::FlipCiphertext if !body.is_empty() => {
                let mut mutated = body.to_vec();
                mutated[0] ^= 0x01;
                (Bytes::from(mutated), TamperAction::FlippedCiphertextBit)
            }
            // A plaintext mutator cannot see inside ciphertext.
            _ => (body, TamperAction::Untouched),
        },

        ProtectionMode::Plain | ProtectionMode::Signed => match policy.mode {
            TamperMode::MutatePlaintext => mutate_plain(body, policy),
            _ => (body, TamperAction::Untouched),
        },
    }
}

fn mutate_plain(body: Bytes, policy: &TamperPolicy) -> (Bytes, TamperAction) {
    match serde_json::from_slice::<TaskMessage>(&body) {
        Ok(mut message) => {
            message.content.push_str(&policy.marker);
            match serde_json::to_vec(&message) {
                Ok(mutated) => (Bytes::from(mutated), TamperAction::MutatedContent),
                Err(_) => append_byte(body),
            }
        }
        Err(_) => append_byte(body),
    }
}

fn append_byte(body: Bytes) -> (Bytes, TamperAction) {
    let mut mutated = body.to_vec();
    mutated.push(0x00);
    (Bytes::from(mutated), TamperAction::AppendedByte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_a2a_core::infrastructure::codec::{
        CONTENT_TYPE_HPKE, CONTENT_TYPE_JSON, HEADER_SESSION_ID,
    };
    use axum::http::{header, HeaderValue};

    fn headers_for(content_type: &'static str, session: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(sid) = session {
            headers.insert(HEADER_SESSION_ID, HeaderValue::from_str(sid).unwrap());
        }
        headers
    }

    fn task_body() -> Bytes {
        let message = TaskMessage::new("did:aegis:a", "did:aegis:b", "task.request", "pay 100");
        Bytes::from(serde_json::to_vec(&message).unwrap())
    }

    #[test]
    fn test_off_is_identity() {
        let headers = headers_for(CONTENT_TYPE_JSON, None);
        let body = task_body();
        let (out, action) = inject(&headers, body.clone(), &TamperPolicy::off());
        assert_eq!(out, body);
        assert_eq!(action, TamperAction::Untouched);
    }

    #[test]
    fn test_handshake_never_tampered() {
        let headers = headers_for(CONTENT_TYPE_HPKE, None);
        let body = Bytes::from_static(b"{\"suite\":\"x\",\"epk\":\"y\"}");
        for policy in [TamperPolicy::flip_ciphertext(), TamperPolicy::mutate_plaintext()] {
            let (out, action) = inject(&headers, body.clone(), &policy);
            assert_eq!(out, body);
            assert_eq!(action, TamperAction::Untouched);
        }
    }

    #[test]
    fn test_flip_alters_byte_zero_of_ciphertext() {
        let headers = headers_for(CONTENT_TYPE_HPKE, Some("s-1"));
        let body = Bytes::from_static(&[0xAA, 0xBB, 0xCC]);
        let (out, action) = inject(&headers, body.clone(), &TamperPolicy::flip_ciphertext());
        assert_eq!(action, TamperAction::FlippedCiphertextBit);
        assert_ne!(out[0], body[0]);
        assert_eq!(&out[1..], &body[1..]);
        assert_eq!(out.len(), body.len());
    }

    #[test]
    fn test_flip_mode_leaves_plain_traffic_alone() {
        let headers = headers_for(CONTENT_TYPE_JSON, None);
        let body = task_body();
        let (out, action) = inject(&headers, body.clone(), &TamperPolicy::flip_ciphertext());
        assert_eq!(out, body);
        assert_eq!(action, TamperAction::Untouched);
    }

    #[test]
    fn test_mutate_appends_marker_to_content() {
        let headers = headers_for(CONTENT_TYPE_JSON, None);
        let (out, action) = inject(&headers, task_body(), &TamperPolicy::mutate_plaintext());
        assert_eq!(action, TamperAction::MutatedContent);
        let mutated: TaskMessage = serde_json::from_slice(&out).unwrap();
        assert!(mutated.content.ends_with(" [tampered-by-proxy]"));
        assert!(mutated.content.starts_with("pay 100"));
    }

    #[test]
    fn test_mutate_mode_cannot_touch_ciphertext() {
        let headers = headers_for(CONTENT_TYPE_HPKE, Some("s-1"));
        let body = Bytes::from_static(&[1, 2, 3]);
        let (out, action) = inject(&headers, body.clone(), &TamperPolicy::mutate_plaintext());
        assert_eq!(out, body);
        assert_eq!(action, TamperAction::Untouched);
    }

    #[test]
    fn test_non_message_body_gets_one_extra_byte() {
        let headers = headers_for(CONTENT_TYPE_JSON, None);
        let body = Bytes::from_static(b"opaque bytes");
        let (out, action) = inject(&headers, body.clone(), &TamperPolicy::mutate_plaintext());
        assert_eq!(action, TamperAction::AppendedByte);
        assert_eq!(out.len(), body.len() + 1);
        assert_eq!(&out[..body.len()], &body[..]);
    }

    #[test]
    fn test_empty_ciphertext_untouched() {
        let headers = headers_for(CONTENT_TYPE_HPKE, Some("s-1"));
        let (out, action) = inject(&headers, Bytes::new(), &TamperPolicy::flip_ciphertext());
        assert!(out.is_empty());
        assert_eq!(action, TamperAction::Untouched);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Envelope codec: maps a task message plus mode metadata to and from HTTP
//! headers + body.
//!
//! There is no framed wire envelope. The protection mode of an inbound
//! request is classified from headers alone, and that ad hoc rule is
//! isolated in [`classify_mode`] so a more principled envelope can replace
//! it later without touching the dispatcher. The tamper proxy calls the same
//! function. Classification never requires parsing signatures.
//!
//! Decode never touches the body: the digest guard must run over exactly
//! what was received.

use axum::http::{header, HeaderMap, HeaderValue};

use crate::domain::envelope::{Envelope, ProtectionMode};
use crate::domain::error::TransportError;

pub const HEADER_IDENTITY: &str = "x-a2a-identity";
pub const HEADER_MESSAGE_ID: &str = "x-a2a-message-id";
pub const HEADER_CONTEXT_ID: &str = "x-a2a-context-id";
pub const HEADER_TASK_ID: &str = "x-a2a-task-id";
pub const HEADER_SESSION_ID: &str = "x-a2a-session-id";
pub const HEADER_ENCRYPTED: &str = "x-a2a-encrypted";
pub const HEADER_SCENARIO: &str = "x-a2a-scenario";
pub const HEADER_SIGNATURE: &str = "signature";
pub const HEADER_SIGNATURE_INPUT: &str = "signature-input";
pub const HEADER_CONTENT_DIGEST: &str = "content-digest";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_HPKE: &str = "application/x-hpke";
/// Value of the `x-a2a-encrypted` marker header.
pub const HPKE_MARKER: &str = "hpke";

/// Read a header as a trimmed string, tolerating non-UTF8 by dropping it.
pub fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Classify an inbound request's protection mode from headers alone.
///
/// Rule, in order: (a) HPKE marker present (by content-type or by the
/// marker header) makes the request a candidate HPKE request, otherwise it
/// is plain (signed requests look plain here; the Verification Gate tells
/// them apart). (b) Within HPKE, a session-id header means data mode, its
/// absence means handshake. Unrecognized marker values default to plain.
pub fn classify_mode(headers: &HeaderMap) -> ProtectionMode {
    let content_type_hpke = header_str(headers, header::CONTENT_TYPE.as_str())
        .map(|v| v.to_ascii_lowercase().starts_with(CONTENT_TYPE_HPKE))
        .unwrap_or(false);
    let marker_hpke = header_str(headers, HEADER_ENCRYPTED)
        .map(|v| v.eq_ignore_ascii_case(HPKE_MARKER))
        .unwrap_or(false);

    if !(content_type_hpke || marker_hpke) {
        return ProtectionMode::Plain;
    }

    if header_str(headers, HEADER_SESSION_ID).is_some() {
        ProtectionMode::HpkeData
    } else {
        ProtectionMode::HpkeHandshake
    }
}

/// Reconstruct the envelope from request headers. Body bytes are not read
/// here and must not be mutated before the digest guard runs.
pub fn decode(headers: &HeaderMap) -> Envelope {
    let mode = classify_mode(headers);
    Envelope {
        claimed_identity: header_str(headers, HEADER_IDENTITY),
        message_id: header_str(headers, HEADER_MESSAGE_ID),
        context_id: header_str(headers, HEADER_CONTEXT_ID),
        task_id: header_str(headers, HEADER_TASK_ID),
        scenario: header_str(headers, HEADER_SCENARIO),
        session_id: if mode == ProtectionMode::HpkeData {
            header_str(headers, HEADER_SESSION_ID)
        } else {
            None
        },
        mode,
        verified_identity: None,
    }
}

fn set_opt(headers: &mut HeaderMap, name: &'static str, value: Option<&String>) {
    if let Some(value) = value {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
}

/// Render an envelope into outbound headers.
///
/// For plain/signed modes the body is the JSON task message and the content
/// type is JSON. For HPKE modes the content type switches to the HPKE media
/// type and the marker header is set; data mode additionally carries the
/// session id.
///
/// # Errors
///
/// [`TransportError::Configuration`] when the envelope violates the
/// session-id/mode invariant.
pub fn encode(envelope: &Envelope) -> Result<HeaderMap, TransportError> {
    envelope.validate()?;

    let mut headers = HeaderMap::new();
    let content_type = match envelope.mode {
        ProtectionMode::Plain | ProtectionMode::Signed => CONTENT_TYPE_JSON,
        ProtectionMode::HpkeHandshake | ProtectionMode::HpkeData => CONTENT_TYPE_HPKE,
    };
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));

    if envelope.mode.is_hpke() {
        headers.insert(HEADER_ENCRYPTED, HeaderValue::from_static(HPKE_MARKER));
    }
    set_opt(&mut headers, HEADER_SESSION_ID, envelope.session_id.as_ref());
    set_opt(&mut headers, HEADER_IDENTITY, envelope.claimed_identity.as_ref());
    set_opt(&mut headers, HEADER_MESSAGE_ID, envelope.message_id.as_ref());
    set_opt(&mut headers, HEADER_CONTEXT_ID, envelope.context_id.as_ref());
    set_opt(&mut headers, HEADER_TASK_ID, envelope.task_id.as_ref());
    set_opt(&mut headers, HEADER_SCENARIO, envelope.scenario.as_ref());

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hpke_headers(session_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_HPKE));
        if let Some(sid) = session_id {
            headers.insert(HEADER_SESSION_ID, HeaderValue::from_str(sid).unwrap());
        }
        headers
    }

    #[test]
    fn test_classify_plain_without_marker() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        assert_eq!(classify_mode(&headers), ProtectionMode::Plain);
    }

    #[test]
    fn test_classify_handshake_vs_data() {
        assert_eq!(classify_mode(&hpke_headers(None)), ProtectionMode::HpkeHandshake);
        assert_eq!(classify_mode(&hpke_headers(Some("s-1"))), ProtectionMode::HpkeData);
    }

    #[test]
    fn test_marker_header_alone_is_enough() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(HEADER_ENCRYPTED, HeaderValue::from_static("HPKE"));
        assert_eq!(classify_mode(&headers), ProtectionMode::HpkeHandshake);
    }

    #[test]
    fn test_unrecognized_marker_defaults_to_plain() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_ENCRYPTED, HeaderValue::from_static("rot13"));
        assert_eq!(classify_mode(&headers), ProtectionMode::Plain);
    }

    #[test]
    fn test_session_header_without_marker_stays_plain() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(HEADER_SESSION_ID, HeaderValue::from_static("stale"));
        assert_eq!(classify_mode(&headers), ProtectionMode::Plain);
    }

    #[test]
    fn test_encode_decode_roundtrip_metadata() {
        let envelope = Envelope::new(ProtectionMode::HpkeData)
            .with_identity("did:aegis:alice")
            .with_message_id("m-1")
            .with_context("c-1")
            .with_session("s-1");
        let headers = encode(&envelope).unwrap();
        let decoded = decode(&headers);

        assert_eq!(decoded.mode, ProtectionMode::HpkeData);
        assert_eq!(decoded.session_id.as_deref(), Some("s-1"));
        assert_eq!(decoded.claimed_identity.as_deref(), Some("did:aegis:alice"));
        assert_eq!(decoded.message_id.as_deref(), Some("m-1"));
        assert_eq!(decoded.context_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn test_encode_rejects_invariant_violation() {
        let envelope = Envelope::new(ProtectionMode::HpkeData);
        assert!(encode(&envelope).is_err());
    }

    #[test]
    fn test_plain_decode_has_no_session() {
        let envelope = Envelope::new(ProtectionMode::Plain).with_identity("did:aegis:bob");
        let headers = encode(&envelope).unwrap();
        let decoded = decode(&headers);
        assert_eq!(decoded.mode, ProtectionMode::Plain);
        assert!(decoded.session_id.is_none());
    }
}

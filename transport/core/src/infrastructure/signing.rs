// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Detached HTTP signatures: parameter headers, signature base, Ed25519.
//!
//! A signature covers a component set drawn from the request line and
//! headers (method, path, content type, content digest, claimed identity),
//! computed over the exact received bytes' digest. The wire format follows
//! the `signature-input` / `signature` header pair convention:
//!
//! ```text
//! signature-input: sig1=("@method" "@path" "content-type" "content-digest" \
//!                  "x-a2a-identity");created=1700000000;keyid="key-1";alg="ed25519"
//! signature:       sig1=:MEUCIQ…:
//! ```

use axum::http::{HeaderMap, HeaderValue};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::domain::collaborators::{SigningIdentity, SigningService};
use crate::domain::error::{DenialReason, TransportError};
use crate::infrastructure::codec::{
    header_str, HEADER_SIGNATURE, HEADER_SIGNATURE_INPUT,
};

/// Signature label used on the wire. One signature per request.
pub const SIGNATURE_LABEL: &str = "sig1";
/// The only algorithm this transport accepts.
pub const SIGNATURE_ALG: &str = "ed25519";
/// Components every accepted signature must cover.
pub const COVERED_COMPONENTS: &[&str] = &[
    "@method",
    "@path",
    "content-type",
    "content-digest",
    "x-a2a-identity",
];

/// Parsed (or to-be-serialized) signature parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureParams {
    pub covered: Vec<String>,
    pub key_id: String,
    pub algorithm: String,
    pub created: i64,
}

impl SignatureParams {
    /// Fresh parameters over the configured component set.
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            covered: COVERED_COMPONENTS.iter().map(|c| c.to_string()).collect(),
            key_id: key_id.into(),
            algorithm: SIGNATURE_ALG.to_string(),
            created: chrono::Utc::now().timestamp(),
        }
    }

    /// Inner parameter string, shared between the header value and the
    /// `@signature-params` line of the signature base.
    fn params_str(&self) -> String {
        let components = self
            .covered
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "({components});created={};keyid=\"{}\";alg=\"{}\"",
            self.created, self.key_id, self.algorithm
        )
    }

    /// Render the `signature-input` header value.
    pub fn to_signature_input(&self) -> String {
        format!("{SIGNATURE_LABEL}={}", self.params_str())
    }

    /// Parse a `signature-input` header value.
    ///
    /// # Errors
    ///
    /// [`DenialReason::SignatureMalformed`] on any structural problem.
    pub fn parse(header_value: &str) -> Result<Self, DenialReason> {
        let malformed = DenialReason::SignatureMalformed;
        let rest = header_value
            .trim()
            .strip_prefix(SIGNATURE_LABEL)
            .and_then(|r| r.strip_prefix('='))
            .ok_or(malformed)?;

        let inner = rest.strip_prefix('(').ok_or(malformed)?;
        let close = inner.find(')').ok_or(malformed)?;
        let covered = inner[..close]
            .split_whitespace()
            .map(|c| c.trim_matches('"').to_string())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>();
        if covered.is_empty() {
            return Err(malformed);
        }

        let mut key_id = None;
        let mut algorithm = None;
        let mut created = None;
        for param in inner[close + 1..].split(';').filter(|p| !p.trim().is_empty()) {
            let (name, value) = param.trim().split_once('=').ok_or(malformed)?;
            let value = value.trim_matches('"');
            match name {
                "keyid" => key_id = Some(value.to_string()),
                "alg" => algorithm = Some(value.to_string()),
                "created" => created = Some(value.parse::<i64>().map_err(|_| malformed)?),
                // Unknown parameters are carried by peers we do not control.
                _ => {}
            }
        }

        Ok(Self {
            covered,
            key_id: key_id.ok_or(malformed)?,
            algorithm: algorithm.ok_or(malformed)?,
            created: created.ok_or(malformed)?,
        })
    }

    /// True when every configured component is covered by this signature.
    pub fn covers_required(&self) -> bool {
        COVERED_COMPONENTS
            .iter()
            .all(|required| self.covered.iter().any(|c| c == required))
    }
}

/// Build the signature base: one line per covered component, in covered
/// order, closed by the `@signature-params` line. Derived components
/// (`@method`, `@path`) come from the request line; everything else is a
/// header looked up case-insensitively.
///
/// # Errors
///
/// [`DenialReason::SignatureMalformed`] when a covered header is absent.
pub fn build_signature_base(
    params: &SignatureParams,
    method: &str,
    path: &str,
    headers: &HeaderMap,
) -> Result<String, DenialReason> {
    let mut base = String::new();
    for component in &params.covered {
        let value = match component.as_str() {
            "@method" => method.to_ascii_uppercase(),
            "@path" => path.to_string(),
            name => header_str(headers, name).ok_or(DenialReason::SignatureMalformed)?,
        };
        base.push_str(&format!("\"{component}\": {value}\n"));
    }
    base.push_str(&format!("\"@signature-params\": {}", params.params_str()));
    Ok(base)
}

/// Attach `signature-input` and `signature` headers.
pub fn attach_signature(headers: &mut HeaderMap, params: &SignatureParams, signature: &[u8]) {
    let input = params.to_signature_input();
    let sig = format!("{SIGNATURE_LABEL}=:{}:", STANDARD.encode(signature));
    if let (Ok(input), Ok(sig)) = (HeaderValue::from_str(&input), HeaderValue::from_str(&sig)) {
        headers.insert(HEADER_SIGNATURE_INPUT, input);
        headers.insert(HEADER_SIGNATURE, sig);
    }
}

/// Extract signature material from request headers.
///
/// Returns `Ok(None)` when neither header is present (unsigned request).
///
/// # Errors
///
/// [`DenialReason::SignatureMalformed`] when only one header is present or
/// either fails to parse.
pub fn extract_signature(
    headers: &HeaderMap,
) -> Result<Option<(SignatureParams, Vec<u8>)>, DenialReason> {
    let input = header_str(headers, HEADER_SIGNATURE_INPUT);
    let signature = header_str(headers, HEADER_SIGNATURE);
    let (input, signature) = match (input, signature) {
        (None, None) => return Ok(None),
        (Some(input), Some(signature)) => (input, signature),
        _ => return Err(DenialReason::SignatureMalformed),
    };

    let params = SignatureParams::parse(&input)?;
    let encoded = signature
        .trim()
        .strip_prefix(SIGNATURE_LABEL)
        .and_then(|r| r.strip_prefix("=:"))
        .and_then(|r| r.strip_suffix(':'))
        .ok_or(DenialReason::SignatureMalformed)?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| DenialReason::SignatureMalformed)?;

    Ok(Some((params, bytes)))
}

/// Ed25519 implementation of the signing collaborator.
pub struct Ed25519SigningService;

impl SigningService for Ed25519SigningService {
    fn sign(&self, base: &[u8], identity: &SigningIdentity) -> Result<Vec<u8>, TransportError> {
        let secret: [u8; 32] = identity.secret_bytes().try_into().map_err(|_| {
            TransportError::Configuration("signing key must be 32 bytes".to_string())
        })?;
        let signing_key = SigningKey::from_bytes(&secret);
        Ok(signing_key.sign(base).to_bytes().to_vec())
    }

    fn verify(
        &self,
        base: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<(), TransportError> {
        let invalid = TransportError::Authentication(DenialReason::SignatureInvalid);
        let public: [u8; 32] = public_key.try_into().map_err(|_| {
            TransportError::Authentication(DenialReason::SignatureInvalid)
        })?;
        let verifying_key = VerifyingKey::from_bytes(&public)
            .map_err(|_| TransportError::Authentication(DenialReason::SignatureInvalid))?;
        let sig_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| TransportError::Authentication(DenialReason::SignatureMalformed))?;
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(base, &signature).map_err(|_| invalid)
    }
}

/// Convenience used by tests and provisioning code: derive the DID string
/// and identity from a raw Ed25519 secret.
pub fn identity_from_secret(secret: [u8; 32]) -> (SigningIdentity, Vec<u8>) {
    let signing_key = SigningKey::from_bytes(&secret);
    let public = signing_key.verifying_key().to_bytes().to_vec();
    let did = format!("did:aegis:{}", hex::encode(&public[..8]));
    let key_id = format!("{did}#sig-1");
    (
        SigningIdentity::new(did, key_id, secret.to_vec()),
        public,
    )
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent transport configuration.
//!
//! Loaded from YAML the same way agent manifests are elsewhere in the
//! platform. Process wiring (which file, which flags) stays outside this
//! crate; this module only defines the shape and the boundary validation.

use serde::{Deserialize, Serialize};

use crate::domain::error::TransportError;

/// A known peer: identity plus the endpoint it receives tasks on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub did: String,
    pub url: String,
}

/// Transport configuration for one agent service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name reported by the status probe.
    pub name: String,
    /// Agent type reported by the status probe (e.g. "hotel", "payment").
    #[serde(rename = "type")]
    pub kind: String,
    /// Listen address, e.g. "127.0.0.1:8181".
    pub listen_addr: String,
    /// Domain-prefixed message endpoint, e.g. "/a2a/hotel".
    pub route_path: String,
    /// Sign outbound requests.
    #[serde(default)]
    pub signed: bool,
    /// Session-encrypt outbound requests. Requires `signed`.
    #[serde(default)]
    pub encrypted: bool,
    /// Known peers for outbound hops.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

impl AgentConfig {
    /// Parse from YAML and validate.
    pub fn from_yaml(raw: &str) -> Result<Self, TransportError> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| TransportError::Configuration(format!("invalid agent config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Boundary validation. Encrypted-without-signed is the one flag
    /// combination the transport refuses outright.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.encrypted && !self.signed {
            return Err(TransportError::Configuration(
                "encrypted mode requires signed mode".to_string(),
            ));
        }
        if !self.route_path.starts_with('/') {
            return Err(TransportError::Configuration(format!(
                "route_path must be absolute, got {:?}",
                self.route_path
            )));
        }
        Ok(())
    }
}

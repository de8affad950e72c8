// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task message exchanged between two agents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single task exchanged between two agents.
///
/// Immutable once sent; serialized as the JSON request/response body. The
/// transport never interprets `content`; it is opaque business payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Message id (UUID), unique per message.
    pub id: String,
    /// Sender DID.
    pub from: String,
    /// Recipient DID.
    pub to: String,
    /// Message type discriminator (e.g. "task.request", "task.response").
    #[serde(rename = "type")]
    pub kind: String,
    /// Business payload.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata, forwarded verbatim.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl TaskMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Build a response to this message: sender and recipient swapped,
    /// fresh id and timestamp, metadata not carried over.
    pub fn reply(&self, kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(self.to.clone(), self.from.clone(), kind, content)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

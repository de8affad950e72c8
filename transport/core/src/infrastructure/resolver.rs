// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory identity-to-key registry.
//!
//! Stands in for whatever directory publishes agent keys in a deployment.
//! Provisioning happens out of band via [`InMemoryKeyResolver::register`].

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::collaborators::{KeyResolver, KeyType};

pub struct InMemoryKeyResolver {
    keys: RwLock<HashMap<(String, KeyType), Vec<u8>>>,
}

impl InMemoryKeyResolver {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, identity: impl Into<String>, key_type: KeyType, key: Vec<u8>) {
        let mut guard = self.keys.write().await;
        guard.insert((identity.into(), key_type), key);
    }
}

impl Default for InMemoryKeyResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyResolver for InMemoryKeyResolver {
    async fn resolve_public_key(
        &self,
        identity: &str,
        key_type: KeyType,
    ) -> Result<Option<Vec<u8>>> {
        let guard = self.keys.read().await;
        Ok(guard.get(&(identity.to_string(), key_type)).cloned())
    }
}

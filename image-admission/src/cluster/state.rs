// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! In-memory [`ClusterAccessor`] backed by a JSON document. The one-shot
//! CLI uses it in place of a live API server.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{
    ClusterAccessor, Error, RegistrySecurityPolicy, Result, Secret, SignerKeyRecord,
    SignerPolicyRecord, WhiteList,
};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    #[serde(default)]
    pub secrets: Vec<Secret>,

    #[serde(default)]
    pub registry_policies: Vec<RegistrySecurityPolicy>,

    #[serde(default)]
    pub signer_policies: Vec<SignerPolicyRecord>,

    #[serde(default)]
    pub signer_keys: Vec<SignerKeyRecord>,

    #[serde(default)]
    pub whitelist: WhiteList,
}

#[derive(Debug, Default)]
pub struct StaticCluster {
    state: RwLock<ClusterState>,
}

impl StaticCluster {
    pub fn new(state: ClusterState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load = || -> anyhow::Result<ClusterState> {
            let content = std::fs::read(path).context("read file")?;
            serde_json::from_slice(&content).context("parse cluster state")
        };
        let state = load().map_err(|source| Error::LoadState {
            path: path.display().to_string(),
            source,
        })?;
        debug!(
            "loaded cluster state from {}: {} registry policies, {} signer policies",
            path.display(),
            state.registry_policies.len(),
            state.signer_policies.len()
        );
        Ok(Self::new(state))
    }

    /// Replace the whole state, as a change notification from the API server
    /// would. Caches pick the change up on their next refresh.
    pub async fn replace(&self, state: ClusterState) {
        *self.state.write().await = state;
    }
}

#[async_trait]
impl ClusterAccessor for StaticCluster {
    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let state = self.state.read().await;
        Ok(state
            .secrets
            .iter()
            .find(|s| s.namespace == namespace && s.name == name)
            .cloned())
    }

    async fn registry_policies(&self) -> Result<Vec<RegistrySecurityPolicy>> {
        Ok(self.state.read().await.registry_policies.clone())
    }

    async fn signer_policies(&self) -> Result<Vec<SignerPolicyRecord>> {
        Ok(self.state.read().await.signer_policies.clone())
    }

    async fn signer_key(&self, name: &str) -> Result<Option<SignerKeyRecord>> {
        let state = self.state.read().await;
        Ok(state.signer_keys.iter().find(|k| k.name == name).cloned())
    }

    async fn whitelist(&self) -> Result<WhiteList> {
        Ok(self.state.read().await.whitelist.clone())
    }
}

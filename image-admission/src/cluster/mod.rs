// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Narrow view of the cluster configuration store. The engine only needs
//! pull secrets and a few custom policy records, so the cluster API is
//! reduced to the [`ClusterAccessor`] capability.

pub mod state;

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use state::{ClusterState, StaticCluster};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("get {kind} failed")]
    Lookup {
        kind: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("load cluster state from {path} failed")]
    LoadState {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A namespaced secret. `data` values are base64 encoded, as the API server
/// returns them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Secret {
    pub name: String,

    pub namespace: String,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,

    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl Secret {
    /// Decoded value of `key`, `None` if the key is absent.
    pub fn value(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, base64::DecodeError> {
        self.data
            .get(key)
            .map(|encoded| STANDARD.decode(encoded.trim()))
            .transpose()
    }
}

/// Security policy for one registry. A policy without `namespace` applies
/// cluster-wide.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySecurityPolicy {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub namespace: Option<String>,

    pub registry: String,

    /// Notary server that holds the trust data for the registry's images.
    #[serde(default)]
    pub notary: Option<String>,

    #[serde(default)]
    pub sign_check: bool,
}

impl RegistrySecurityPolicy {
    pub fn notary_url(&self) -> Option<&str> {
        self.notary.as_deref().filter(|url| !url.is_empty())
    }
}

/// Names the signers whose keys may sign images run in `namespace`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignerPolicyRecord {
    #[serde(default)]
    pub name: String,

    pub namespace: String,

    #[serde(default)]
    pub signers: Vec<String>,
}

/// Resolves a signer name to the key IDs it signs targets with.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignerKeyRecord {
    pub name: String,

    #[serde(default)]
    pub target_key_ids: Vec<String>,
}

/// Images and namespaces exempt from validation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct WhiteList {
    /// Substrings matched against the canonical `host/name:tag` image form.
    #[serde(default)]
    pub images: Vec<String>,

    /// Namespaces matched exactly.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    /// Get a secret. A secret that does not exist is `Ok(None)`.
    async fn secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn registry_policies(&self) -> Result<Vec<RegistrySecurityPolicy>>;

    async fn signer_policies(&self) -> Result<Vec<SignerPolicyRecord>>;

    /// Get the keys of one signer. An unknown signer is `Ok(None)`.
    async fn signer_key(&self, name: &str) -> Result<Option<SignerKeyRecord>>;

    async fn whitelist(&self) -> Result<WhiteList>;
}

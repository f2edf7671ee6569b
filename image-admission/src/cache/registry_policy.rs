// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{collections::HashMap, sync::Arc};

use log::{info, warn};

use super::Snapshot;
use crate::cluster::{ClusterAccessor, RegistrySecurityPolicy, Result};

/// Policies of one registry host.
#[derive(Debug, Default)]
struct HostPolicies {
    namespaced: HashMap<String, RegistrySecurityPolicy>,
    cluster_wide: Option<RegistrySecurityPolicy>,
}

/// Registry security policies indexed by host, then namespace.
#[derive(Debug, Default)]
pub struct RegistryPolicyIndex {
    by_host: HashMap<String, HostPolicies>,
}

/// Policies may name the registry as a bare host or as its server URL.
fn normalize_host(registry: &str) -> String {
    registry
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_ascii_lowercase()
}

impl RegistryPolicyIndex {
    /// Index `policies`. At most one policy applies per (host, namespace);
    /// the first one listed is kept.
    pub fn build(policies: Vec<RegistrySecurityPolicy>) -> Self {
        let mut by_host: HashMap<String, HostPolicies> = HashMap::new();
        for policy in policies {
            let host = normalize_host(&policy.registry);
            if host.is_empty() {
                warn!("registry security policy {} names no registry, ignoring", policy.name);
                continue;
            }
            let entry = by_host.entry(host.clone()).or_default();
            let slot = match &policy.namespace {
                Some(namespace) if !namespace.is_empty() => {
                    if entry.namespaced.contains_key(namespace) {
                        None
                    } else {
                        entry.namespaced.insert(namespace.clone(), policy.clone());
                        Some(())
                    }
                }
                _ => match entry.cluster_wide {
                    Some(_) => None,
                    None => {
                        entry.cluster_wide = Some(policy.clone());
                        Some(())
                    }
                },
            };
            if slot.is_none() {
                warn!(
                    "registry security policy {} duplicates an earlier policy for {host}, ignoring",
                    policy.name
                );
            }
        }
        Self { by_host }
    }

    /// The policy for `host` in `namespace`: a policy of that namespace
    /// first, then a cluster-wide one.
    pub fn matches(&self, host: &str, namespace: &str) -> Option<&RegistrySecurityPolicy> {
        let policies = self.by_host.get(&normalize_host(host))?;
        policies
            .namespaced
            .get(namespace)
            .or(policies.cluster_wide.as_ref())
    }

    pub fn len(&self) -> usize {
        self.by_host
            .values()
            .map(|p| p.namespaced.len() + usize::from(p.cluster_wide.is_some()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RegistryPolicyCache {
    cluster: Arc<dyn ClusterAccessor>,
    snapshot: Snapshot<RegistryPolicyIndex>,
}

impl RegistryPolicyCache {
    /// Create the cache and fill it from the cluster.
    pub async fn new(cluster: Arc<dyn ClusterAccessor>) -> Result<Self> {
        let cache = Self {
            cluster,
            snapshot: Snapshot::default(),
        };
        cache.refresh().await?;
        Ok(cache)
    }

    pub async fn refresh(&self) -> Result<()> {
        let index = self.fetch().await?;
        self.install(index).await;
        Ok(())
    }

    /// Build a new index from the cluster without publishing it.
    pub async fn fetch(&self) -> Result<RegistryPolicyIndex> {
        Ok(RegistryPolicyIndex::build(self.cluster.registry_policies().await?))
    }

    pub async fn install(&self, index: RegistryPolicyIndex) {
        info!("registry policy cache refreshed, {} policies", index.len());
        self.snapshot.store(index).await;
    }

    pub async fn matches(&self, host: &str, namespace: &str) -> Option<RegistrySecurityPolicy> {
        self.snapshot.load().await.matches(host, namespace).cloned()
    }
}

// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{collections::HashMap, sync::Arc};

use log::info;

use super::Snapshot;
use crate::cluster::{ClusterAccessor, Result, SignerPolicyRecord};

pub type PoliciesByNamespace = HashMap<String, Vec<SignerPolicyRecord>>;

/// Signer policies grouped by namespace.
pub struct SignerPolicyCache {
    cluster: Arc<dyn ClusterAccessor>,
    snapshot: Snapshot<PoliciesByNamespace>,
}

impl SignerPolicyCache {
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
        let policies = self.fetch().await?;
        self.install(policies).await;
        Ok(())
    }

    /// Group the cluster's policies by namespace without publishing them.
    pub async fn fetch(&self) -> Result<PoliciesByNamespace> {
        let mut by_namespace = PoliciesByNamespace::new();
        for policy in self.cluster.signer_policies().await? {
            by_namespace
                .entry(policy.namespace.clone())
                .or_default()
                .push(policy);
        }
        Ok(by_namespace)
    }

    pub async fn install(&self, policies: PoliciesByNamespace) {
        let count: usize = policies.values().map(Vec::len).sum();
        info!("signer policy cache refreshed, {count} policies");
        self.snapshot.store(policies).await;
    }

    pub async fn for_namespace(&self, namespace: &str) -> Vec<SignerPolicyRecord> {
        self.snapshot
            .load()
            .await
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterState, StaticCluster};

    #[tokio::test]
    async fn policies_by_namespace() {
        let record = |name: &str, namespace: &str| SignerPolicyRecord {
            name: name.into(),
            namespace: namespace.into(),
            signers: vec!["ci".into()],
        };
        let cluster = StaticCluster::new(ClusterState {
            signer_policies: vec![record("a", "team-a"), record("b", "team-b"), record("a2", "team-a")],
            ..Default::default()
        });
        let cache = SignerPolicyCache::new(Arc::new(cluster)).await.unwrap();

        let names: Vec<String> = cache
            .for_namespace("team-a")
            .await
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "a2"]);
        assert!(cache.for_namespace("team-c").await.is_empty());
    }
}

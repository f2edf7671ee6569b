// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Decides whether signed trust data was produced by a signer the pod's
//! namespace authorizes.

use std::{collections::HashSet, sync::Arc};

use log::{debug, warn};

use crate::{
    cluster::{ClusterAccessor, SignerPolicyRecord},
    trust::{SignedTagRow, TrustSummary},
    Result,
};

pub struct SignerPolicyMatcher {
    cluster: Arc<dyn ClusterAccessor>,
}

impl SignerPolicyMatcher {
    pub fn new(cluster: Arc<dyn ClusterAccessor>) -> Self {
        Self { cluster }
    }

    /// Whether `row` of `summary` is signed by an authorized signer.
    ///
    /// - A summary without signed tags never matches.
    /// - Without a signer policy for `namespace`, any signature matches.
    /// - Otherwise a key vouching for `row` must belong to a signer named by
    ///   one of the namespace's policies. Signer keys are looked up on every
    ///   call.
    pub async fn matches(
        &self,
        summary: &TrustSummary,
        row: &SignedTagRow,
        policies: &[SignerPolicyRecord],
        namespace: &str,
    ) -> Result<bool> {
        if summary.is_empty() {
            return Ok(false);
        }

        let policies: Vec<&SignerPolicyRecord> = policies
            .iter()
            .filter(|policy| policy.namespace == namespace)
            .collect();
        if policies.is_empty() {
            debug!("no signer policy in namespace {namespace}, any signature is accepted");
            return Ok(true);
        }

        let contributing: HashSet<&str> = summary.contributing_keys(row).into_iter().collect();
        let mut looked_up = HashSet::new();
        for signer in policies.iter().flat_map(|policy| policy.signers.iter()) {
            if !looked_up.insert(signer.as_str()) {
                continue;
            }
            let Some(key) = self.cluster.signer_key(signer).await? else {
                warn!("signer {signer} named by a signer policy in {namespace} has no keys");
                continue;
            };
            if key
                .target_key_ids
                .iter()
                .any(|id| contributing.contains(id.as_str()))
            {
                debug!("{} is signed by authorized signer {signer}", summary.name);
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::{ClusterState, SignerKeyRecord, StaticCluster},
        trust::summary::{summarize, SignedTarget},
    };

    fn summary(targets_keys: &[&str]) -> TrustSummary {
        let targets = vec![
            SignedTarget {
                role: "targets".into(),
                tag: "v1".into(),
                digest: "d1".into(),
            },
            SignedTarget {
                role: "targets/alice".into(),
                tag: "v1".into(),
                digest: "d1".into(),
            },
        ];
        summarize(
            "reg.io/app",
            &targets,
            &["root".to_string()],
            &targets_keys.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &[("targets/alice".to_string(), vec!["alice-key".to_string()])],
        )
    }

    fn matcher(keys: Vec<(&str, Vec<&str>)>) -> SignerPolicyMatcher {
        let cluster = StaticCluster::new(ClusterState {
            signer_keys: keys
                .into_iter()
                .map(|(name, ids)| SignerKeyRecord {
                    name: name.to_string(),
                    target_key_ids: ids.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
            ..Default::default()
        });
        SignerPolicyMatcher::new(Arc::new(cluster))
    }

    fn policy(namespace: &str, signers: &[&str]) -> SignerPolicyRecord {
        SignerPolicyRecord {
            name: "policy".into(),
            namespace: namespace.into(),
            signers: signers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn no_policy_accepts_any_signature() {
        let summary = summary(&["repo-key"]);
        let row = summary.signed_tags[0].clone();
        let policies = [policy("other", &["nobody"])];
        assert!(matcher(vec![])
            .matches(&summary, &row, &policies, "team-a")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn empty_summary_never_matches() {
        let summary = TrustSummary::default();
        let row = SignedTagRow {
            signed_tag: "v1".into(),
            digest: "d1".into(),
            signers: vec![],
        };
        assert!(!matcher(vec![])
            .matches(&summary, &row, &[], "team-a")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn authorized_repository_key() {
        let summary = summary(&["repo-key"]);
        let row = summary.signed_tags[0].clone();
        let policies = [policy("team-a", &["ci", "release"])];
        let matcher = matcher(vec![("ci", vec!["other"]), ("release", vec!["repo-key"])]);
        assert!(matcher
            .matches(&summary, &row, &policies, "team-a")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn authorized_delegated_key() {
        let summary = summary(&["repo-key"]);
        let row = summary.signed_tags[0].clone();
        let policies = [policy("team-a", &["alice"])];
        let matcher = matcher(vec![("alice", vec!["alice-key"])]);
        assert!(matcher
            .matches(&summary, &row, &policies, "team-a")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn unknown_or_unrelated_signers_do_not_match() {
        let summary = summary(&["repo-key"]);
        let row = summary.signed_tags[0].clone();
        let policies = [policy("team-a", &["ghost", "mallory"])];
        let matcher = matcher(vec![("mallory", vec!["mallory-key"])]);
        assert!(!matcher
            .matches(&summary, &row, &policies, "team-a")
            .await
            .unwrap());
    }
}

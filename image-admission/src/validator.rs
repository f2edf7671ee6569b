// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! The admission decision for one pod.

use std::{fmt, sync::Arc, time::Duration};

use log::{debug, info, warn};
use strum::Display;
use tokio::task::JoinHandle;

use crate::{
    auth::credential_for_reference,
    cache::{RegistryPolicyCache, SignerPolicyCache, WhitelistCache},
    cluster::ClusterAccessor,
    pod::{Container, LocalObjectReference, Pod},
    reference::ImageRef,
    signer::SignerPolicyMatcher,
    trust::{SignatureFetcher, TagSignature},
    Result,
};

/// Why an image was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DenyReason {
    /// No registry security policy covers the image's registry.
    NoRegistryPolicy,
    /// No trust data, no signed row for the tag, or no authorized signer.
    NotSigned,
    /// The image names a digest other than the signed one.
    DigestMismatch,
    /// The tag is signed with more than one digest.
    AmbiguousDigest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied { image: String, reason: DenyReason },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self::Denied { image, reason } = self else {
            return write!(f, "allowed");
        };
        match reason {
            DenyReason::NoRegistryPolicy => write!(
                f,
                "Image '{image}' does not meet registry security policy. Please check the RegistrySecurityPolicy"
            ),
            DenyReason::NotSigned => write!(f, "Image '{image}' is not signed"),
            DenyReason::DigestMismatch => {
                write!(f, "Image '{image}''s digest is different from the signed digest")
            }
            DenyReason::AmbiguousDigest => {
                write!(f, "Image '{image}' is signed with more than one digest")
            }
        }
    }
}

/// Validates pods against the registry, signer and whitelist policies of the
/// cluster and pins every signed image to its signed digest.
///
/// One `Validator` serves all admission requests. Policies are read from
/// caches; call [`Validator::refresh`] or [`Validator::spawn_refresh`] to
/// pick up changes.
pub struct Validator {
    cluster: Arc<dyn ClusterAccessor>,
    fetcher: Arc<dyn SignatureFetcher>,
    registry_policies: RegistryPolicyCache,
    signer_policies: SignerPolicyCache,
    whitelist: WhitelistCache,
    matcher: SignerPolicyMatcher,
}

impl Validator {
    /// Create a validator with caches filled from `cluster`.
    pub async fn new(
        cluster: Arc<dyn ClusterAccessor>,
        fetcher: Arc<dyn SignatureFetcher>,
    ) -> Result<Self> {
        let (registry_policies, signer_policies, whitelist) = tokio::try_join!(
            RegistryPolicyCache::new(cluster.clone()),
            SignerPolicyCache::new(cluster.clone()),
            WhitelistCache::new(cluster.clone()),
        )?;

        Ok(Self {
            matcher: SignerPolicyMatcher::new(cluster.clone()),
            cluster,
            fetcher,
            registry_policies,
            signer_policies,
            whitelist,
        })
    }

    /// Reload every cache from the cluster. Nothing is replaced unless all
    /// three snapshots were read.
    pub async fn refresh(&self) -> Result<()> {
        let (registry_policies, signer_policies, whitelist) = tokio::try_join!(
            self.registry_policies.fetch(),
            self.signer_policies.fetch(),
            self.whitelist.fetch(),
        )?;
        self.registry_policies.install(registry_policies).await;
        self.signer_policies.install(signer_policies).await;
        self.whitelist.install(whitelist).await;
        Ok(())
    }

    /// Refresh the caches every `period` until the handle is aborted. A
    /// failed refresh keeps the previous snapshots.
    ///
    /// Panics if `period` is zero.
    pub fn spawn_refresh(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately and the caches are fresh.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!("refresh policy caches failed, keeping the previous ones: {e:?}");
                }
            }
        })
    }

    /// Check every init container and container of `pod`, in order.
    ///
    /// Signed images are rewritten in place to
    /// `host/name:tag@sha256:<digest>`. The check stops at the first denied
    /// image; containers after it are left untouched.
    pub async fn check_is_valid_and_add_digest(&self, pod: &mut Pod) -> Result<Verdict> {
        let namespace = pod.metadata.namespace.as_str();
        if self.whitelist.is_namespace_whitelisted(namespace).await {
            debug!("namespace {namespace} is whitelisted");
            return Ok(Verdict::Allowed);
        }

        let spec = &mut pod.spec;
        let pull_secrets = &spec.image_pull_secrets;
        for container in spec
            .init_containers
            .iter_mut()
            .chain(spec.containers.iter_mut())
        {
            if let Some(reason) = self
                .check_container(container, namespace, pull_secrets)
                .await?
            {
                info!(
                    "deny image {} of container {} in {namespace}: {reason}",
                    container.image, container.name
                );
                return Ok(Verdict::Denied {
                    image: container.image.clone(),
                    reason,
                });
            }
        }

        Ok(Verdict::Allowed)
    }

    async fn check_container(
        &self,
        container: &mut Container,
        namespace: &str,
        pull_secrets: &[LocalObjectReference],
    ) -> Result<Option<DenyReason>> {
        if self.whitelist.is_image_whitelisted(&container.image).await {
            debug!("image {} is whitelisted", container.image);
            return Ok(None);
        }

        let mut reference = ImageRef::parse(&container.image);
        let auth =
            credential_for_reference(self.cluster.as_ref(), &reference, namespace, pull_secrets)
                .await?;

        let Some(policy) = self
            .registry_policies
            .matches(reference.registry(), namespace)
            .await
        else {
            return Ok(Some(DenyReason::NoRegistryPolicy));
        };
        let Some(notary) = policy.notary_url() else {
            debug!(
                "registry policy {} names no notary server, accept {}",
                policy.name, container.image
            );
            return Ok(None);
        };
        if !policy.sign_check {
            debug!(
                "registry policy {} does not require signatures, accept {}",
                policy.name, container.image
            );
            return Ok(None);
        }

        let Some(summary) = self
            .fetcher
            .fetch_signature(&reference, auth.as_ref(), notary)
            .await?
        else {
            debug!("no trust data for {}", reference.name_with_host());
            return Ok(Some(DenyReason::NotSigned));
        };

        let row = match summary.signed_row(reference.tag()) {
            TagSignature::Signed(row) => row,
            TagSignature::Unsigned => {
                debug!("tag {} of {} is not signed", reference.tag(), summary.name);
                return Ok(Some(DenyReason::NotSigned));
            }
            TagSignature::Ambiguous(digests) => {
                warn!(
                    "tag {} of {} is signed with digests {digests:?}",
                    reference.tag(),
                    summary.name
                );
                return Ok(Some(DenyReason::AmbiguousDigest));
            }
        };

        let policies = self.signer_policies.for_namespace(namespace).await;
        if !self
            .matcher
            .matches(&summary, row, &policies, namespace)
            .await?
        {
            return Ok(Some(DenyReason::NotSigned));
        }

        if !reference.pin(&row.digest) {
            return Ok(Some(DenyReason::DigestMismatch));
        }
        container.image = reference.to_string();
        debug!("pinned container {} to {}", container.name, container.image);
        Ok(None)
    }
}

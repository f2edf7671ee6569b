// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{collections::HashSet, sync::Arc};

use log::{info, warn};

use super::Snapshot;
use crate::{
    cluster::{ClusterAccessor, Result, WhiteList},
    reference::ImageRef,
};

#[derive(Debug, Default)]
pub struct WhitelistIndex {
    images: Vec<String>,
    namespaces: HashSet<String>,
}

impl From<WhiteList> for WhitelistIndex {
    fn from(list: WhiteList) -> Self {
        let images = list
            .images
            .into_iter()
            .filter(|image| {
                let empty = image.trim().is_empty();
                if empty {
                    warn!("empty image whitelist entry would exempt every image, ignoring");
                }
                !empty
            })
            .collect();
        Self {
            images,
            namespaces: list.namespaces.into_iter().collect(),
        }
    }
}

pub struct WhitelistCache {
    cluster: Arc<dyn ClusterAccessor>,
    snapshot: Snapshot<WhitelistIndex>,
}

impl WhitelistCache {
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
    pub async fn fetch(&self) -> Result<WhitelistIndex> {
        Ok(WhitelistIndex::from(self.cluster.whitelist().await?))
    }

    pub async fn install(&self, index: WhitelistIndex) {
        info!(
            "whitelist cache refreshed, {} images, {} namespaces",
            index.images.len(),
            index.namespaces.len()
        );
        self.snapshot.store(index).await;
    }

    /// Whether some whitelist entry is a substring of the canonical
    /// `host/name:tag` form of `image`.
    pub async fn is_image_whitelisted(&self, image: &str) -> bool {
        let canonical = ImageRef::parse(image).without_digest();
        self.snapshot
            .load()
            .await
            .images
            .iter()
            .any(|entry| canonical.contains(entry.as_str()))
    }

    pub async fn is_namespace_whitelisted(&self, namespace: &str) -> bool {
        self.snapshot.load().await.namespaces.contains(namespace)
    }
}

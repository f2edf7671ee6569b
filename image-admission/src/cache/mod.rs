// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Read-mostly caches of cluster records, shared by all in-flight
//! validations.
//!
//! Every cache holds an immutable snapshot behind a [`Snapshot`]. A refresh
//! builds a complete new snapshot from the cluster and swaps it in, so a
//! reader sees either the old or the new records, never a mix.

pub mod registry_policy;
pub mod signer_policy;
pub mod whitelist;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use registry_policy::RegistryPolicyCache;
pub use signer_policy::SignerPolicyCache;
pub use whitelist::WhitelistCache;

/// An atomically replaceable `Arc<T>`. Locks are held only for the clone
/// or the swap of the `Arc`, never while the snapshot is read.
#[derive(Debug, Default)]
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    pub async fn load(&self) -> Arc<T> {
        self.current.read().await.clone()
    }

    pub async fn store(&self, value: T) {
        let value = Arc::new(value);
        *self.current.write().await = value;
    }
}

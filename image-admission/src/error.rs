// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

use crate::{auth, cluster, trust};

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that abort a validation run. Policy rejections are not errors,
/// they are reported through [`crate::Verdict::Denied`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("cluster lookup failed")]
    Cluster(#[from] cluster::Error),

    #[error("trust data retrieval failed")]
    Trust(#[from] trust::TrustError),

    #[error("registry credential resolution failed")]
    Auth(#[from] auth::Error),
}

// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! JSON patch (RFC 6902) describing the image rewrites of a validated pod,
//! in the shape a mutating admission response carries.

use serde::Serialize;

use crate::pod::{Container, Pod};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatchOperation {
    pub op: &'static str,
    pub path: String,
    pub value: String,
}

fn replacements(field: &str, original: &[Container], mutated: &[Container]) -> Vec<PatchOperation> {
    original
        .iter()
        .zip(mutated)
        .enumerate()
        .filter(|(_, (before, after))| before.image != after.image)
        .map(|(i, (_, after))| PatchOperation {
            op: "replace",
            path: format!("/spec/{field}/{i}/image"),
            value: after.image.clone(),
        })
        .collect()
}

/// `replace` operations for every container image that differs between
/// `original` and `mutated`.
pub fn image_patches(original: &Pod, mutated: &Pod) -> Vec<PatchOperation> {
    let mut patches = replacements(
        "initContainers",
        &original.spec.init_containers,
        &mutated.spec.init_containers,
    );
    patches.extend(replacements(
        "containers",
        &original.spec.containers,
        &mutated.spec.containers,
    ));
    patches
}

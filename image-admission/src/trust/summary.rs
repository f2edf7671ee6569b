// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Reduction of raw notary target records into a [`TrustSummary`], the
//! same view `docker trust inspect` prints.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use serde::Serialize;

use super::tuf::{RELEASES_ROLE, ROOT_ROLE, SNAPSHOT_ROLE, TARGETS_ROLE, TIMESTAMP_ROLE};

/// Signer name for tags signed only by the repository's own targets keys.
pub const REPO_ADMIN_SIGNER: &str = "Repo Admin";

pub const ROOT_KEYS_NAME: &str = "Root";
pub const REPOSITORY_KEYS_NAME: &str = "Repository";

/// A target as signed by one role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTarget {
    pub role: String,
    pub tag: String,
    /// Hex sha256.
    pub digest: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedTagRow {
    pub signed_tag: String,
    pub digest: String,
    pub signers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustSigner {
    pub name: String,
    pub keys: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustSummary {
    pub name: String,
    pub signed_tags: Vec<SignedTagRow>,
    pub signers: Vec<TrustSigner>,
    pub administrative_keys: Vec<TrustSigner>,
}

/// Outcome of looking a tag up in a [`TrustSummary`].
#[derive(Debug, PartialEq, Eq)]
pub enum TagSignature<'a> {
    Unsigned,
    Signed(&'a SignedTagRow),
    /// Released roles signed the tag with more than one digest.
    Ambiguous(Vec<&'a str>),
}

impl TrustSummary {
    pub fn is_empty(&self) -> bool {
        self.signed_tags.is_empty()
    }

    pub fn signed_row(&self, tag: &str) -> TagSignature<'_> {
        let rows: Vec<&SignedTagRow> = self
            .signed_tags
            .iter()
            .filter(|row| row.signed_tag == tag)
            .collect();

        match rows.as_slice() {
            [] => TagSignature::Unsigned,
            [row] => TagSignature::Signed(*row),
            rows => TagSignature::Ambiguous(rows.iter().map(|&row| row.digest.as_str()).collect()),
        }
    }

    /// Keys of a delegated signer, by its summary name.
    pub fn signer_keys(&self, name: &str) -> Option<&[String]> {
        self.signers
            .iter()
            .find(|signer| signer.name == name)
            .map(|signer| signer.keys.as_slice())
    }

    /// Every key that vouches for `row`: the administrative keys plus the
    /// keys of the delegated roles listed as its signers.
    pub fn contributing_keys<'a>(&'a self, row: &'a SignedTagRow) -> Vec<&'a str> {
        let mut keys: Vec<&str> = self
            .administrative_keys
            .iter()
            .flat_map(|admin| admin.keys.iter().map(String::as_str))
            .collect();
        for signer in &row.signers {
            if let Some(signer_keys) = self.signer_keys(signer) {
                keys.extend(signer_keys.iter().map(String::as_str));
            }
        }
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

/// `targets` and `targets/releases` publish released tags.
pub fn is_released_role(role: &str) -> bool {
    role == TARGETS_ROLE || role == RELEASES_ROLE
}

/// Human readable signer name of a delegated role.
pub fn role_to_signer(role: &str) -> String {
    if is_released_role(role) {
        return REPO_ADMIN_SIGNER.to_string();
    }
    role.strip_prefix("targets/").unwrap_or(role).to_string()
}

/// Build the summary of a repository.
///
/// One row is produced per distinct (tag, digest) pair signed by a released
/// role; every other delegated role that signed the same pair is listed as a
/// signer of the row. Rows nobody but a released role signed are attributed
/// to [`REPO_ADMIN_SIGNER`].
pub fn summarize(
    name: &str,
    targets: &[SignedTarget],
    root_keys: &[String],
    targets_keys: &[String],
    delegations: &[(String, Vec<String>)],
) -> TrustSummary {
    let mut released: HashMap<(&str, &str), Vec<String>> = HashMap::new();
    for target in targets.iter().filter(|t| is_released_role(&t.role)) {
        released
            .entry((target.tag.as_str(), target.digest.as_str()))
            .or_default();
    }
    for target in targets.iter().filter(|t| !is_released_role(&t.role)) {
        if let Some(signers) = released.get_mut(&(target.tag.as_str(), target.digest.as_str())) {
            let signer = role_to_signer(&target.role);
            if !signers.contains(&signer) {
                signers.push(signer);
            }
        }
    }

    let mut signed_tags: Vec<SignedTagRow> = released
        .into_iter()
        .map(|((tag, digest), mut signers)| {
            if signers.is_empty() {
                signers.push(REPO_ADMIN_SIGNER.to_string());
            }
            signers.sort();
            SignedTagRow {
                signed_tag: tag.to_string(),
                digest: digest.to_string(),
                signers,
            }
        })
        .collect();
    signed_tags.sort_by(|a, b| {
        natural_cmp(&a.signed_tag, &b.signed_tag).then_with(|| a.digest.cmp(&b.digest))
    });

    let mut signer_keys: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (role, keyids) in delegations {
        if matches!(
            role.as_str(),
            RELEASES_ROLE | ROOT_ROLE | SNAPSHOT_ROLE | TARGETS_ROLE | TIMESTAMP_ROLE
        ) {
            continue;
        }
        signer_keys.insert(role_to_signer(role), keyids.clone());
    }
    let signers = signer_keys
        .into_iter()
        .map(|(name, keys)| TrustSigner { name, keys })
        .collect();

    let administrative_keys = vec![
        TrustSigner {
            name: ROOT_KEYS_NAME.to_string(),
            keys: root_keys.to_vec(),
        },
        TrustSigner {
            name: REPOSITORY_KEYS_NAME.to_string(),
            keys: targets_keys.to_vec(),
        },
    ];

    TrustSummary {
        name: name.to_string(),
        signed_tags,
        signers,
        administrative_keys,
    }
}

/// Compare strings with digit runs ordered by numeric value, so `v2` sorts
/// before `v10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.chars().next(), b.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let a_len = a.find(|c: char| !c.is_ascii_digit()).unwrap_or(a.len());
                let b_len = b.find(|c: char| !c.is_ascii_digit()).unwrap_or(b.len());
                let a_num = a[..a_len].trim_start_matches('0');
                let b_num = b[..b_len].trim_start_matches('0');
                let ord = a_num
                    .len()
                    .cmp(&b_num.len())
                    .then_with(|| a_num.cmp(b_num))
                    .then_with(|| a_len.cmp(&b_len));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = &a[a_len..];
                b = &b[b_len..];
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a = &a[x.len_utf8()..];
                b = &b[y.len_utf8()..];
            }
        }
    }
}

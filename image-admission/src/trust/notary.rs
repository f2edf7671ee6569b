// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Retrieval of a repository's TUF roles from a notary server
//! (`GET /v2/<gun>/_trust/tuf/<role>.json`).

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use url::Url;

use super::{
    summary::SignedTarget,
    keys::PublicKey,
    token::Token,
    tuf::{self, DelegationRole, Delegations, Root, Signed, Targets, ROOT_ROLE, TARGETS_ROLE},
    Result, TrustError,
};

/// Upper bound on the delegated roles walked for one repository.
pub const MAX_DELEGATED_ROLES: usize = 64;

/// Everything the trust summary is reduced from.
#[derive(Debug, Default)]
pub struct RepositoryMetadata {
    pub targets: Vec<SignedTarget>,
    pub root_keys: Vec<String>,
    pub targets_keys: Vec<String>,
    pub delegations: Vec<(String, Vec<String>)>,
}

/// Append `path` to the path of `base`, keeping any prefix the notary
/// server is mounted under.
pub fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{}", base.path().trim_end_matches('/'), path);
    url.set_path(&joined);
    url
}

pub struct NotaryRepository<'a> {
    client: &'a Client,
    base: &'a Url,
    gun: &'a str,
    token: &'a Token,
}

impl<'a> NotaryRepository<'a> {
    pub fn new(client: &'a Client, base: &'a Url, gun: &'a str, token: &'a Token) -> Self {
        Self {
            client,
            base,
            gun,
            token,
        }
    }

    /// Raw metadata of one role, `None` if the server has none.
    async fn get_role(&self, role: &str) -> Result<Option<Vec<u8>>> {
        let url = endpoint(self.base, &format!("v2/{}/_trust/tuf/{role}.json", self.gun));
        let mut request = self.client.get(url.clone());
        if let Some(authorization) = self.token.authorization() {
            request = request.header(AUTHORIZATION, authorization);
        }

        let transport = |source| TrustError::Transport {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED => Err(TrustError::Unauthorized {
                url: url.to_string(),
            }),
            status if status.is_success() => {
                let body = response.bytes().await.map_err(transport)?;
                Ok(Some(body.to_vec()))
            }
            status => Err(TrustError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    /// Fetch `root`, `targets` and every delegated role reachable from
    /// `targets`. `None` if the repository has no trust data.
    pub async fn fetch(&self, now: DateTime<Utc>) -> Result<Option<RepositoryMetadata>> {
        let Some(raw) = self.get_role(ROOT_ROLE).await? else {
            debug!("no root metadata for {}", self.gun);
            return Ok(None);
        };
        let root: Signed<Root> = tuf::parse(ROOT_ROLE, &raw)?;
        let root_keys = root.signed.role_keys(ROOT_ROLE)?.clone();
        root.check(ROOT_ROLE, &root_keys, &root.signed.keys, now)?;
        let targets_keys = root.signed.role_keys(TARGETS_ROLE)?.clone();

        let Some(raw) = self.get_role(TARGETS_ROLE).await? else {
            debug!("no targets metadata for {}", self.gun);
            return Ok(None);
        };
        let top: Signed<Targets> = tuf::parse(TARGETS_ROLE, &raw)?;
        top.check(TARGETS_ROLE, &targets_keys, &root.signed.keys, now)?;

        let mut metadata = RepositoryMetadata {
            root_keys: root_keys.keyids,
            targets_keys: targets_keys.keyids,
            ..Default::default()
        };
        collect_targets(TARGETS_ROLE, &top.signed, None, &mut metadata.targets)?;

        // Each delegated role travels with the keys its parent published.
        let mut queue: VecDeque<(DelegationRole, Arc<HashMap<String, PublicKey>>)> =
            VecDeque::new();
        if let Some(delegations) = top.signed.delegations {
            enqueue(&mut queue, delegations, None);
        }
        let mut seen = HashSet::new();
        while let Some((role, keys)) = queue.pop_front() {
            if !seen.insert(role.name.clone()) {
                continue;
            }
            if seen.len() > MAX_DELEGATED_ROLES {
                return Err(TrustError::Metadata {
                    role: role.name,
                    reason: format!("more than {MAX_DELEGATED_ROLES} delegated roles"),
                });
            }
            check_role_name(&role.name)?;
            metadata
                .delegations
                .push((role.name.clone(), role.keyids.clone()));

            let Some(raw) = self.get_role(&role.name).await? else {
                debug!("delegated role {} of {} is not published", role.name, self.gun);
                continue;
            };
            let delegated: Signed<Targets> = tuf::parse(&role.name, &raw)?;
            delegated.check(&role.name, &role.keys(), &keys, now)?;
            collect_targets(&role.name, &delegated.signed, Some(&role), &mut metadata.targets)?;

            if let Some(delegations) = delegated.signed.delegations {
                enqueue(&mut queue, delegations, Some(&role.name));
            }
        }

        Ok(Some(metadata))
    }
}

/// Queue the roles of `delegations`. Below the top level only children of
/// `parent` may be delegated.
fn enqueue(
    queue: &mut VecDeque<(DelegationRole, Arc<HashMap<String, PublicKey>>)>,
    delegations: Delegations,
    parent: Option<&str>,
) {
    let keys = Arc::new(delegations.keys);
    let prefix = parent.map(|name| format!("{name}/"));
    queue.extend(
        delegations
            .roles
            .into_iter()
            .filter(|child| match &prefix {
                Some(prefix) => child.name.starts_with(prefix.as_str()),
                None => true,
            })
            .map(|child| (child, keys.clone())),
    );
}

/// Delegated role names are paths under `targets/` and end up in request
/// URLs.
fn check_role_name(name: &str) -> Result<()> {
    let valid = name
        .strip_prefix("targets/")
        .is_some_and(|rest| rest.split('/').all(|s| !s.is_empty() && s != "." && s != ".."));
    if !valid {
        return Err(TrustError::Metadata {
            role: name.into(),
            reason: "delegated role name is not under targets/".into(),
        });
    }
    Ok(())
}

fn collect_targets(
    role: &str,
    targets: &Targets,
    delegation: Option<&DelegationRole>,
    out: &mut Vec<SignedTarget>,
) -> Result<()> {
    for (name, file) in &targets.targets {
        if let Some(delegation) = delegation {
            if !delegation.covers(name) {
                debug!("role {role} signs {name} outside its delegated paths, ignoring");
                continue;
            }
        }
        let Some(digest) = file.sha256_hex(role, name)? else {
            debug!("target {name} of role {role} has no sha256, ignoring");
            continue;
        };
        out.push(SignedTarget {
            role: role.to_string(),
            tag: name.clone(),
            digest,
        });
    }
    Ok(())
}

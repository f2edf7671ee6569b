// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Image reference handling in the `registry/name:tag@algorithm:digest` form.

use std::{convert::Infallible, fmt, str::FromStr};

/// Registry host assumed when a reference carries no host segment.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Registry endpoint that serves `docker.io` images.
pub const DOCKER_HUB_SERVER: &str = "https://registry-1.docker.io";

pub const DEFAULT_TAG: &str = "latest";

/// Algorithm of the digests notary signs, and of a digest written without
/// one.
pub const SHA256: &str = "sha256";

/// `algorithm:encoded` part of a reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    fn parse(digest: &str) -> Option<Self> {
        let (algorithm, encoded) = digest.split_once(':').unwrap_or((SHA256, digest));
        if encoded.is_empty() {
            return None;
        }
        Some(Self {
            algorithm: algorithm.to_ascii_lowercase(),
            encoded: encoded.to_ascii_lowercase(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: String,
    repository: String,
    tag: String,
    digest: Option<Digest>,
}

impl ImageRef {
    /// Parse an image string. Any input is accepted; in the worst case the
    /// repository name is empty.
    pub fn parse(image: &str) -> Self {
        let (rest, digest) = match image.split_once('@') {
            Some((rest, digest)) => (rest, Digest::parse(digest)),
            None => (image, None),
        };

        let (registry, name) = match rest.split_once('/') {
            Some((first, remainder)) if is_host_like(first) => (first, remainder),
            _ => (DEFAULT_REGISTRY, rest),
        };

        // After the host is removed a ':' can only introduce the tag.
        let (repository, tag) = match name.rsplit_once(':') {
            Some((repository, tag)) if !tag.contains('/') && !tag.is_empty() => (repository, tag),
            Some((repository, "")) => (repository, DEFAULT_TAG),
            _ => (name, DEFAULT_TAG),
        };

        Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest,
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Encoded digest, without the `algorithm:` prefix.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_ref().map(|d| d.encoded.as_str())
    }

    pub fn digest_algorithm(&self) -> Option<&str> {
        self.digest.as_ref().map(|d| d.algorithm.as_str())
    }

    /// Pin the reference to a verified hex sha256 digest. Returns `false` and
    /// leaves the reference untouched if a different digest, or a digest of
    /// another algorithm, is already set.
    pub fn pin(&mut self, digest: &str) -> bool {
        let pinned = Digest {
            algorithm: SHA256.to_string(),
            encoded: digest.to_ascii_lowercase(),
        };
        match &self.digest {
            Some(current) if *current != pinned => false,
            _ => {
                self.digest = Some(pinned);
                true
            }
        }
    }

    /// `registry/name`, the globally unique name the notary server keys trust
    /// data by. Official docker hub images live under `library/`.
    pub fn name_with_host(&self) -> String {
        if self.registry == DEFAULT_REGISTRY && !self.repository.contains('/') {
            return format!("{}/library/{}", self.registry, self.repository);
        }
        format!("{}/{}", self.registry, self.repository)
    }

    /// Canonical form without the digest, used for whitelist matching.
    pub fn without_digest(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }

    /// Server URL that credentials for this registry are stored under.
    pub fn registry_server(&self) -> String {
        if self.registry == DEFAULT_REGISTRY {
            return DOCKER_HUB_SERVER.to_string();
        }
        format!("https://{}", self.registry)
    }
}

impl FromStr for ImageRef {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}:{}", digest.algorithm, digest.encoded)?;
        }
        Ok(())
    }
}

/// A first path segment names a host when it looks like a domain, carries a
/// port, or is `localhost`.
fn is_host_like(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

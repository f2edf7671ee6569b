// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Registry basic-auth credentials taken from a pod's image pull secrets.

use std::{collections::HashMap, fmt};

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cluster::{ClusterAccessor, Secret},
    pod::LocalObjectReference,
    reference::{ImageRef, DEFAULT_REGISTRY},
};

/// Secret keys holding a plain user name and password.
pub const SECRET_ID_KEY: &str = "ID";
pub const SECRET_PASSWD_KEY: &str = "PASSWD";

/// Secret key of a `kubernetes.io/dockerconfigjson` secret.
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

const DOCKER_HUB_ALIASES: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("secret {secret} holds a value that is not base64")]
    Base64Decode {
        secret: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("secret {secret} holds a malformed docker config")]
    DockerConfig {
        secret: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("secret {secret} holds a malformed credential: {reason}")]
    Credential { secret: String, reason: String },
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `base64(username:password)`, the value of a `Basic` authorization header.
    pub fn encoded(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Serialize, Default)]
pub struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthConfig>,
}

#[derive(Deserialize, Serialize, Default)]
pub struct DockerAuthConfig {
    #[serde(default)]
    auth: String,

    #[serde(default)]
    username: String,

    #[serde(default)]
    password: String,
}

/// Resolve basic auth for the image's registry from the pod's pull secrets.
/// The first secret that exists and carries a usable credential wins. No
/// usable secret is not an error, the image may be public.
pub async fn credential_for_reference(
    cluster: &dyn ClusterAccessor,
    reference: &ImageRef,
    namespace: &str,
    pull_secrets: &[LocalObjectReference],
) -> crate::Result<Option<BasicAuth>> {
    for pull_secret in pull_secrets {
        let Some(secret) = cluster.secret(namespace, &pull_secret.name).await? else {
            warn!(
                "image pull secret {namespace}/{} does not exist, skipping",
                pull_secret.name
            );
            continue;
        };

        if let Some(auth) = credential_from_secret(&secret, reference)? {
            debug!(
                "use credential from secret {namespace}/{} for {}",
                secret.name,
                reference.registry()
            );
            return Ok(Some(auth));
        }
    }

    Ok(None)
}

/// Extract a credential for the image's registry from one secret. Plain
/// `ID`/`PASSWD` pairs apply to any registry; docker config entries must
/// name the registry.
pub fn credential_from_secret(secret: &Secret, reference: &ImageRef) -> Result<Option<BasicAuth>> {
    let value = |key: &str| {
        secret.value(key).map_err(|source| Error::Base64Decode {
            secret: secret.name.clone(),
            source,
        })
    };

    if let (Some(id), Some(passwd)) = (value(SECRET_ID_KEY)?, value(SECRET_PASSWD_KEY)?) {
        let username = utf8(secret, id)?;
        let password = utf8(secret, passwd)?;
        return Ok(Some(BasicAuth::new(username.trim(), password.trim())));
    }

    let Some(config) = value(DOCKER_CONFIG_JSON_KEY)? else {
        return Ok(None);
    };
    let config: DockerConfigFile =
        serde_json::from_slice(&config).map_err(|source| Error::DockerConfig {
            secret: secret.name.clone(),
            source,
        })?;

    let Some(entry) = config
        .auths
        .iter()
        .find(|(server, _)| server_matches(server, reference))
        .map(|(_, entry)| entry)
    else {
        return Ok(None);
    };

    if !entry.username.is_empty() {
        return Ok(Some(BasicAuth::new(&entry.username, &entry.password)));
    }
    if entry.auth.is_empty() {
        return Ok(None);
    }

    let decoded = STANDARD
        .decode(entry.auth.trim())
        .map_err(|source| Error::Base64Decode {
            secret: secret.name.clone(),
            source,
        })?;
    let decoded = utf8(secret, decoded)?;
    let Some((username, password)) = decoded.split_once(':') else {
        return Err(Error::Credential {
            secret: secret.name.clone(),
            reason: "auth is not in `username:password` form".into(),
        });
    };
    Ok(Some(BasicAuth::new(username, password)))
}

fn utf8(secret: &Secret, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| Error::Credential {
        secret: secret.name.clone(),
        reason: "value is not valid UTF-8".into(),
    })
}

/// Docker config keys may be a bare host, a URL, or a URL with a path
/// (`https://index.docker.io/v1/`).
fn server_matches(server: &str, reference: &ImageRef) -> bool {
    if server == reference.registry_server() {
        return true;
    }

    let host = server
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default();

    if reference.registry() == DEFAULT_REGISTRY {
        return DOCKER_HUB_ALIASES.contains(&host);
    }
    host.eq_ignore_ascii_case(reference.registry())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::cluster::{ClusterState, StaticCluster};

    fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            name: name.into(),
            namespace: "team-a".into(),
            secret_type: None,
            data: data
                .iter()
                .map(|(k, v)| (k.to_string(), STANDARD.encode(v)))
                .collect(),
        }
    }

    #[test]
    fn id_and_passwd_secret() {
        let secret = secret("plain", &[("ID", "user"), ("PASSWD", "pass")]);
        let auth = credential_from_secret(&secret, &ImageRef::parse("reg.io/app")).unwrap();
        assert_eq!(auth, Some(BasicAuth::new("user", "pass")));
        assert_eq!(BasicAuth::new("user", "pass").encoded(), "dXNlcjpwYXNz");
    }

    #[rstest]
    #[case(r#"{"auths":{"https://reg.io":{"auth":"dXNlcjpwYXNz"}}}"#, "reg.io/app", true)]
    #[case(r#"{"auths":{"reg.io":{"username":"user","password":"pass"}}}"#, "reg.io/app", true)]
    #[case(r#"{"auths":{"https://index.docker.io/v1/":{"auth":"dXNlcjpwYXNz"}}}"#, "nginx", true)]
    #[case(r#"{"auths":{"other.io":{"auth":"dXNlcjpwYXNz"}}}"#, "reg.io/app", false)]
    fn docker_config_secret(#[case] config: &str, #[case] image: &str, #[case] found: bool) {
        let secret = secret("docker", &[(DOCKER_CONFIG_JSON_KEY, config)]);
        let auth = credential_from_secret(&secret, &ImageRef::parse(image)).unwrap();
        assert_eq!(auth.is_some(), found);
        if let Some(auth) = auth {
            assert_eq!(auth, BasicAuth::new("user", "pass"));
        }
    }

    #[test]
    fn malformed_docker_config() {
        let secret = secret("docker", &[(DOCKER_CONFIG_JSON_KEY, "not json")]);
        let err = credential_from_secret(&secret, &ImageRef::parse("reg.io/app")).unwrap_err();
        assert!(matches!(err, Error::DockerConfig { .. }));
    }

    #[test]
    fn debug_hides_password() {
        let debug = format!("{:?}", BasicAuth::new("user", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn first_usable_secret_wins() {
        let cluster = StaticCluster::new(ClusterState {
            secrets: vec![
                secret("unrelated", &[("token", "x")]),
                secret("first", &[("ID", "first"), ("PASSWD", "p1")]),
                secret("second", &[("ID", "second"), ("PASSWD", "p2")]),
            ],
            ..Default::default()
        });
        let pull_secrets: Vec<_> = ["missing", "unrelated", "first", "second"]
            .iter()
            .map(|name| LocalObjectReference {
                name: name.to_string(),
            })
            .collect();

        let auth = credential_for_reference(
            &cluster,
            &ImageRef::parse("reg.io/app"),
            "team-a",
            &pull_secrets,
        )
        .await
        .unwrap();
        assert_eq!(auth, Some(BasicAuth::new("first", "p1")));

        let none = credential_for_reference(&cluster, &ImageRef::parse("reg.io/app"), "team-a", &[])
            .await
            .unwrap();
        assert!(none.is_none());
    }
}

// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{env, path::Path, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use config::{Config, File};
use log::{debug, info};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "IMAGE_ADMISSION_CONFIG";

/// Default period between two cache refreshes.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Configuration of the admission engine.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AdmissionConfig {
    /// JSON document holding the cluster records, used when no live cluster
    /// accessor is wired in.
    ///
    /// This value defaults to `None`.
    #[serde(default = "Option::default")]
    pub cluster_state: Option<PathBuf>,

    /// Seconds between two refreshes of the policy and whitelist caches.
    ///
    /// This defaults to [`DEFAULT_REFRESH_INTERVAL_SECS`].
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// How to talk to notary servers.
    #[serde(default)]
    pub trust: TrustConfig,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TrustConfig {
    /// Accept notary server certificates that do not verify. Only meant for
    /// test clusters with self-signed notary deployments.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Timeout of a single HTTP request to a notary or token server. No
    /// timeout is applied when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

macro_rules! __default_deserialization_value {
    ($name: ident, $type: ident, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

__default_deserialization_value!(
    default_refresh_interval_secs,
    u64,
    DEFAULT_REFRESH_INTERVAL_SECS
);

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cluster_state: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            trust: TrustConfig::default(),
        }
    }
}

impl AdmissionConfig {
    /// Load the configuration from `config_path`, or from the file named by
    /// [`CONFIG_PATH_ENV`], or fall back to the defaults.
    pub fn new(config_path: Option<String>) -> Result<Self> {
        let config_path = config_path.or_else(|| {
            if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
                debug!("Read config path from env: {env_path}");
                return Some(env_path);
            }
            None
        });

        match config_path {
            Some(path) => {
                info!("Use configuration file {path}");
                if !Path::new(&path).exists() {
                    bail!("Config file {path} not found.")
                }
                Self::from_file(&path)
            }
            None => {
                info!("No config path specified, use the default config.");
                Ok(Self::default())
            }
        }
    }

    /// Load `AdmissionConfig` from a configuration file. Supported formats are
    /// all formats supported by the `config` crate.
    fn from_file(config_path: &str) -> Result<Self> {
        let c = Config::builder()
            .set_default("refresh_interval_secs", DEFAULT_REFRESH_INTERVAL_SECS)?
            .add_source(File::with_name(config_path))
            .build()?;

        let res: Self = c.try_deserialize().context("invalid config")?;
        if res.refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be greater than zero");
        }
        Ok(res)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

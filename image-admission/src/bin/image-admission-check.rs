// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Runs one admission decision for a pod against a cluster state snapshot.

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info};

use image_admission::{
    cluster::StaticCluster, config::AdmissionConfig, patch::image_patches, pod::Pod,
    trust::TrustClient, Validator, Verdict,
};

/// Exit status when the pod is denied.
const EXIT_DENIED: i32 = 2;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file. Falls back to $IMAGE_ADMISSION_CONFIG, then defaults.
    #[arg(long)]
    config: Option<String>,

    /// JSON document with secrets, policies, signer keys and the whitelist.
    /// Overrides `cluster_state` from the configuration.
    #[arg(long)]
    cluster_state: Option<PathBuf>,

    /// Pod to validate, in Kubernetes JSON encoding.
    #[arg(long)]
    pod: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = AdmissionConfig::new(cli.config)?;
    debug!("config: {config:?}");

    let state_path = cli
        .cluster_state
        .or(config.cluster_state.clone())
        .ok_or_else(|| anyhow!("no cluster state given, use --cluster-state"))?;
    let cluster = Arc::new(StaticCluster::from_file(&state_path)?);

    let raw = tokio::fs::read(&cli.pod)
        .await
        .with_context(|| format!("read pod {}", cli.pod.display()))?;
    let original: Pod = serde_json::from_slice(&raw).context("parse pod")?;

    let fetcher = Arc::new(TrustClient::new(&config.trust)?);
    let validator = Validator::new(cluster, fetcher).await?;

    let mut pod = original.clone();
    let verdict = validator.check_is_valid_and_add_digest(&mut pod).await?;
    info!(
        "pod {}/{}: {verdict}",
        pod.namespace(),
        pod.metadata.name.as_deref().unwrap_or("<unnamed>")
    );

    let output = match &verdict {
        Verdict::Allowed => serde_json::json!({
            "allowed": true,
            "patch": image_patches(&original, &pod),
        }),
        Verdict::Denied { reason, .. } => serde_json::json!({
            "allowed": false,
            "reason": reason.to_string(),
            "message": verdict.to_string(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !verdict.is_allowed() {
        std::process::exit(EXIT_DENIED);
    }
    Ok(())
}

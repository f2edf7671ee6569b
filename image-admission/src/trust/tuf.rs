// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! The parts of the TUF metadata format (as served by notary) that the trust
//! summary is built from.

use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use super::{
    keys::{canonical_json, PublicKey},
    Result, TrustError,
};

pub const ROOT_ROLE: &str = "root";
pub const TARGETS_ROLE: &str = "targets";
pub const SNAPSHOT_ROLE: &str = "snapshot";
pub const TIMESTAMP_ROLE: &str = "timestamp";

/// The delegation whose targets count as released next to `targets`.
pub const RELEASES_ROLE: &str = "targets/releases";

fn default_threshold() -> usize {
    1
}

/// A signed metadata envelope.
#[derive(Debug, Clone)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,

    /// Canonical JSON of `signed` as served, the bytes signatures cover.
    canonical: Vec<u8>,
}

#[derive(Deserialize)]
struct Envelope {
    signed: Value,

    #[serde(default)]
    signatures: Vec<Signature>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Signature {
    pub keyid: String,

    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub sig: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoleKeys {
    #[serde(default)]
    pub keyids: Vec<String>,

    #[serde(default = "default_threshold")]
    pub threshold: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Root {
    #[serde(rename = "_type")]
    pub kind: String,

    pub expires: DateTime<Utc>,

    #[serde(default)]
    pub keys: HashMap<String, PublicKey>,

    #[serde(default)]
    pub roles: HashMap<String, RoleKeys>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Targets {
    #[serde(rename = "_type")]
    pub kind: String,

    pub expires: DateTime<Utc>,

    #[serde(default)]
    pub targets: HashMap<String, TargetFile>,

    #[serde(default)]
    pub delegations: Option<Delegations>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TargetFile {
    #[serde(default)]
    pub hashes: HashMap<String, String>,

    #[serde(default)]
    pub length: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Delegations {
    /// Keys of the delegated roles, by key id.
    #[serde(default)]
    pub keys: HashMap<String, PublicKey>,

    #[serde(default)]
    pub roles: Vec<DelegationRole>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DelegationRole {
    pub name: String,

    #[serde(default)]
    pub keyids: Vec<String>,

    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Target name prefixes the role may sign. `""` covers every target.
    #[serde(default)]
    pub paths: Vec<String>,
}

impl DelegationRole {
    pub fn keys(&self) -> RoleKeys {
        RoleKeys {
            keyids: self.keyids.clone(),
            threshold: self.threshold,
        }
    }

    pub fn covers(&self, target: &str) -> bool {
        self.paths.iter().any(|prefix| target.starts_with(prefix))
    }
}

impl Root {
    pub fn role_keys(&self, role: &str) -> Result<&RoleKeys> {
        self.roles.get(role).ok_or_else(|| TrustError::Metadata {
            role: ROOT_ROLE.into(),
            reason: format!("root metadata does not declare the {role} role"),
        })
    }
}

impl TargetFile {
    /// Hex sha256 of the target. Notary stores hashes base64 encoded.
    pub fn sha256_hex(&self, role: &str, name: &str) -> Result<Option<String>> {
        let Some(encoded) = self.hashes.get("sha256") else {
            return Ok(None);
        };
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| TrustError::Metadata {
                role: role.into(),
                reason: format!("sha256 of target {name} is not base64: {e}"),
            })?;
        if raw.len() != 32 {
            return Err(TrustError::Metadata {
                role: role.into(),
                reason: format!("sha256 of target {name} has {} bytes", raw.len()),
            });
        }
        Ok(Some(hex::encode(raw)))
    }
}

/// Decode one role's metadata.
pub fn parse<T: DeserializeOwned>(role: &str, raw: &[u8]) -> Result<Signed<T>> {
    let malformed = |source| TrustError::Parse {
        role: role.into(),
        source,
    };
    let envelope: Envelope = serde_json::from_slice(raw).map_err(malformed)?;
    let canonical = canonical_json(&envelope.signed);
    let signed = serde_json::from_value(envelope.signed).map_err(malformed)?;
    Ok(Signed {
        signed,
        signatures: envelope.signatures,
        canonical,
    })
}

/// Common accessors of the role metadata kinds.
pub trait RoleMetadata {
    /// Value of `_type` the role's metadata must carry.
    const KIND: &'static str;

    fn kind(&self) -> &str;

    fn expires(&self) -> DateTime<Utc>;
}

impl RoleMetadata for Root {
    const KIND: &'static str = "Root";

    fn kind(&self) -> &str {
        &self.kind
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

impl RoleMetadata for Targets {
    const KIND: &'static str = "Targets";

    fn kind(&self) -> &str {
        &self.kind
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

impl<T: RoleMetadata> Signed<T> {
    /// Check the envelope of a role: not expired, of the expected type, and
    /// carrying valid signatures of at least `threshold` distinct keys
    /// authorized for the role. `keys` are the trusted keys the authorized
    /// key ids resolve to.
    pub fn check(
        &self,
        role: &str,
        authorized: &RoleKeys,
        keys: &HashMap<String, PublicKey>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reject = |reason: String| TrustError::Metadata {
            role: role.into(),
            reason,
        };

        let kind = self.signed.kind();
        if !kind.eq_ignore_ascii_case(T::KIND) {
            return Err(reject(format!("expected {} metadata, got {kind}", T::KIND)));
        }
        let expires = self.signed.expires();
        if expires <= now {
            return Err(reject(format!("metadata expired at {expires}")));
        }

        let mut verified: HashSet<&str> = HashSet::new();
        for signature in &self.signatures {
            let keyid = signature.keyid.as_str();
            if verified.contains(keyid) || !authorized.keyids.iter().any(|id| id == keyid) {
                continue;
            }
            let Some(key) = keys.get(keyid) else {
                debug!("role {role}: key {keyid} is not published, signature ignored");
                continue;
            };
            if key.key_id() != keyid {
                warn!("role {role}: key published as {keyid} has a different id, signature ignored");
                continue;
            }
            match key.verify(&signature.method, &self.canonical, &signature.sig) {
                Ok(()) => {
                    verified.insert(keyid);
                }
                Err(e) => warn!("role {role}: signature of key {keyid} rejected: {e}"),
            }
        }

        let threshold = authorized.threshold.max(1);
        if verified.len() < threshold {
            return Err(reject(format!(
                "valid signatures of {} authorized keys, threshold is {threshold}",
                verified.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use p256::{
        ecdsa::{signature::Signer, Signature as EcdsaSignature, SigningKey},
        pkcs8::EncodePublicKey,
    };
    use serde_json::json;

    use super::*;
    use crate::trust::keys::{ECDSA_KEY, ECDSA_METHOD};

    struct TestKey {
        key: SigningKey,
        public: PublicKey,
    }

    impl TestKey {
        fn new(seed: u8) -> Self {
            let key = SigningKey::from_slice(&[seed; 32]).unwrap();
            let der = key.verifying_key().to_public_key_der().unwrap();
            let public = PublicKey::new(ECDSA_KEY, STANDARD.encode(der.as_bytes()));
            Self { key, public }
        }

        fn id(&self) -> String {
            self.public.key_id()
        }

        fn signature(&self, signed: &Value) -> Value {
            let sig: EcdsaSignature = self.key.sign(&canonical_json(signed));
            json!({"keyid": self.id(), "method": ECDSA_METHOD, "sig": STANDARD.encode(sig.to_bytes())})
        }
    }

    fn targets(signers: &[&TestKey], expires: DateTime<Utc>) -> Signed<Targets> {
        // Field order and spacing differ from the canonical form on purpose.
        let signed = json!({"targets": {}, "expires": expires, "version": 3, "_type": "Targets"});
        let signatures: Vec<Value> = signers.iter().map(|s| s.signature(&signed)).collect();
        let raw = serde_json::to_vec_pretty(&json!({"signed": signed, "signatures": signatures}))
            .unwrap();
        parse(TARGETS_ROLE, &raw).unwrap()
    }

    fn trusted(signers: &[&TestKey]) -> (RoleKeys, HashMap<String, PublicKey>) {
        let role = RoleKeys {
            keyids: signers.iter().map(|s| s.id()).collect(),
            threshold: signers.len(),
        };
        let keys = signers.iter().map(|s| (s.id(), s.public.clone())).collect();
        (role, keys)
    }

    #[test]
    fn threshold_counts_distinct_verified_keys() {
        let now = Utc::now();
        let (k1, k2, other) = (TestKey::new(1), TestKey::new(2), TestKey::new(3));
        let (role, keys) = trusted(&[&k1, &k2]);
        let expires = now + Duration::days(1);

        targets(&[&k1, &k2], expires)
            .check(TARGETS_ROLE, &role, &keys, now)
            .unwrap();

        let err = targets(&[&k1, &k1, &other], expires)
            .check(TARGETS_ROLE, &role, &keys, now)
            .unwrap_err();
        assert!(matches!(err, TrustError::Metadata { .. }));
    }

    #[test]
    fn forged_signature_is_not_counted() {
        let now = Utc::now();
        let signer = TestKey::new(1);
        let (role, keys) = trusted(&[&signer]);

        let mut envelope = targets(&[&signer], now + Duration::days(1));
        envelope.signatures[0].sig = STANDARD.encode("forged by attacker");
        assert!(envelope.check(TARGETS_ROLE, &role, &keys, now).is_err());

        // A well formed signature over different content.
        let mut envelope = targets(&[&signer], now + Duration::days(1));
        let other: EcdsaSignature = signer.key.sign(b"other metadata");
        envelope.signatures[0].sig = STANDARD.encode(other.to_bytes());
        assert!(envelope.check(TARGETS_ROLE, &role, &keys, now).is_err());
    }

    #[test]
    fn signature_needs_matching_published_key() {
        let now = Utc::now();
        let (signer, impostor) = (TestKey::new(1), TestKey::new(2));
        let envelope = targets(&[&signer], now + Duration::days(1));
        let (role, _) = trusted(&[&signer]);

        assert!(envelope
            .check(TARGETS_ROLE, &role, &HashMap::new(), now)
            .is_err());

        // The key id does not hash to the published key.
        let swapped = HashMap::from([(signer.id(), impostor.public.clone())]);
        assert!(envelope.check(TARGETS_ROLE, &role, &swapped, now).is_err());
    }

    #[test]
    fn unsupported_method_is_not_counted() {
        let now = Utc::now();
        let signer = TestKey::new(1);
        let (role, keys) = trusted(&[&signer]);
        let mut envelope = targets(&[&signer], now + Duration::days(1));
        envelope.signatures[0].method = "ed25519".into();
        assert!(envelope.check(TARGETS_ROLE, &role, &keys, now).is_err());
    }

    #[test]
    fn expired_metadata_is_rejected() {
        let now = Utc::now();
        let signer = TestKey::new(1);
        let (role, keys) = trusted(&[&signer]);
        let err = targets(&[&signer], now - Duration::seconds(1))
            .check(TARGETS_ROLE, &role, &keys, now)
            .unwrap_err();
        assert!(err.to_string().contains("targets"));
    }

    #[test]
    fn target_hash_to_hex() {
        let file = TargetFile {
            hashes: HashMap::from([("sha256".to_string(), STANDARD.encode([0xab_u8; 32]))]),
            length: 10,
        };
        assert_eq!(
            file.sha256_hex(TARGETS_ROLE, "v1").unwrap(),
            Some("ab".repeat(32))
        );

        let short = TargetFile {
            hashes: HashMap::from([("sha256".to_string(), STANDARD.encode([1_u8; 4]))]),
            length: 10,
        };
        assert!(short.sha256_hex(TARGETS_ROLE, "v1").is_err());
    }

    #[test]
    fn delegation_paths() {
        let role = DelegationRole {
            name: "targets/alice".into(),
            keyids: vec![],
            threshold: 1,
            paths: vec!["release-".into()],
        };
        assert!(role.covers("release-1.0"));
        assert!(!role.covers("dev"));
    }
}

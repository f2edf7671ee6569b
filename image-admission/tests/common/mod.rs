// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! A notary server stand-in built on wiremock.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use image_admission::trust::keys::{canonical_json, PublicKey, ECDSA_KEY, ECDSA_METHOD};
use p256::{
    ecdsa::{signature::Signer, Signature, SigningKey},
    pkcs8::EncodePublicKey,
};
use serde_json::{json, Value};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const GUN: &str = "registry.example.com/app";
pub const IMAGE: &str = "registry.example.com/app:v1";
pub const NOT_EXPIRED: &str = "2099-01-01T00:00:00Z";
pub const EXPIRED: &str = "2001-01-01T00:00:00Z";

/// A P-256 signing key together with the public key notary publishes for it.
pub struct TestKey {
    signing: SigningKey,
    pub public: PublicKey,
}

impl TestKey {
    pub fn new(seed: u8) -> Self {
        let signing = SigningKey::from_slice(&[seed; 32]).unwrap();
        let der = signing.verifying_key().to_public_key_der().unwrap();
        let public = PublicKey::new(ECDSA_KEY, STANDARD.encode(der.as_bytes()));
        Self { signing, public }
    }

    pub fn id(&self) -> String {
        self.public.key_id()
    }

    /// Signature entry of this key over `signed`.
    pub fn signature(&self, signed: &Value) -> Value {
        let sig: Signature = self.signing.sign(&canonical_json(signed));
        json!({"keyid": self.id(), "method": ECDSA_METHOD, "sig": STANDARD.encode(sig.to_bytes())})
    }

    /// `signed` wrapped in an envelope signed by this key.
    pub fn envelope(&self, signed: Value) -> Value {
        let signature = self.signature(&signed);
        json!({"signed": signed, "signatures": [signature]})
    }
}

pub fn root_key() -> TestKey {
    TestKey::new(1)
}

pub fn repo_key() -> TestKey {
    TestKey::new(2)
}

pub fn release_key() -> TestKey {
    TestKey::new(3)
}

pub fn alice_key() -> TestKey {
    TestKey::new(4)
}

pub fn intruder_key() -> TestKey {
    TestKey::new(9)
}

/// Base64 and hex forms of a sha256 made of `byte` repeated.
pub fn sha256(byte: u8) -> (String, String) {
    let raw = [byte; 32];
    (STANDARD.encode(raw), hex::encode(raw))
}

pub fn role_path(role: &str) -> String {
    format!("/v2/{GUN}/_trust/tuf/{role}.json")
}

/// Root publishing the root and repository keys, signed by the root key.
pub fn root_json(expires: &str) -> Value {
    let (root, repo) = (root_key(), repo_key());
    root.envelope(json!({
        "_type": "Root",
        "expires": expires,
        "keys": {
            root.id(): root.public,
            repo.id(): repo.public
        },
        "roles": {
            "root": {"keyids": [root.id()], "threshold": 1},
            "targets": {"keyids": [repo.id()], "threshold": 1}
        },
        "version": 1
    }))
}

/// The `signed` part of a targets role listing `(tag, hash byte)` pairs.
pub fn targets_signed(targets: &[(&str, u8)], delegations: Option<Value>) -> Value {
    let targets: serde_json::Map<String, Value> = targets
        .iter()
        .map(|(tag, byte)| {
            let (encoded, _) = sha256(*byte);
            (tag.to_string(), json!({"hashes": {"sha256": encoded}, "length": 1024}))
        })
        .collect();
    let mut signed = json!({
        "_type": "Targets",
        "expires": NOT_EXPIRED,
        "targets": targets,
        "version": 1
    });
    if let Some(delegations) = delegations {
        signed["delegations"] = delegations;
    }
    signed
}

/// A targets envelope signed by `key`, listing `(tag, hash byte)` pairs.
pub fn targets_json(key: &TestKey, targets: &[(&str, u8)], delegations: Option<Value>) -> Value {
    key.envelope(targets_signed(targets, delegations))
}

/// `delegations` object delegating each `(role, key, paths)`.
pub fn delegations_json(roles: &[(&str, &TestKey, &[&str])]) -> Value {
    let keys: serde_json::Map<String, Value> = roles
        .iter()
        .map(|(_, key, _)| (key.id(), json!(key.public)))
        .collect();
    let roles: Vec<Value> = roles
        .iter()
        .map(|(name, key, paths)| {
            json!({"name": name, "keyids": [key.id()], "threshold": 1, "paths": paths})
        })
        .collect();
    json!({"keys": keys, "roles": roles})
}

/// `/v2/` answers with a bearer challenge pointing at `/token` of the same
/// server.
pub async fn mount_bearer_challenge(server: &MockServer) {
    let challenge = format!(
        r#"Bearer realm="{}/token",service="notary.example.com""#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge.as_str()))
        .mount(server)
        .await;
}

pub async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": token,
            "expires_in": 300
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Serve `body` for `role` to requests presenting `token`.
pub async fn mount_role(server: &MockServer, role: &str, token: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(role_path(role)))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// A notary holding `tag` signed by the repository key with hash byte `byte`.
pub async fn mount_signed_repository(server: &MockServer, token: &str, tag: &str, byte: u8) {
    mount_bearer_challenge(server).await;
    mount_token(server, token, 1).await;
    mount_role(server, "root", token, root_json(NOT_EXPIRED)).await;
    mount_role(server, "targets", token, targets_json(&repo_key(), &[(tag, byte)], None)).await;
}

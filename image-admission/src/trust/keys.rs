// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Notary public keys and the verification of role signatures.
//!
//! A role is signed over the canonical JSON of its `signed` object: object
//! keys sorted, no insignificant whitespace, strings escaped the way Go's
//! `encoding/json` escapes them.

use base64::{engine::general_purpose::STANDARD, Engine};
use p256::{
    ecdsa::{signature::Verifier, Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_cert::{der::DecodePem, Certificate};

/// P-256 public key, base64 DER `SubjectPublicKeyInfo`.
pub const ECDSA_KEY: &str = "ecdsa";

/// P-256 public key inside a base64 PEM certificate. Notary root keys have
/// this type.
pub const ECDSA_X509_KEY: &str = "ecdsa-x509";

/// ECDSA over SHA-256, signature is the raw `r || s`.
pub const ECDSA_METHOD: &str = "ecdsa";

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("unsupported key type {0}")]
    UnsupportedKeyType(String),

    #[error("unsupported signature method {0}")]
    UnsupportedMethod(String),

    #[error("malformed public key: {0}")]
    MalformedKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature does not match the signed metadata")]
    BadSignature,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub keytype: String,
    pub keyval: KeyValue,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    #[serde(default)]
    pub public: String,

    #[serde(default)]
    pub private: Option<String>,
}

impl PublicKey {
    pub fn new(keytype: &str, public: String) -> Self {
        Self {
            keytype: keytype.into(),
            keyval: KeyValue {
                public,
                private: None,
            },
        }
    }

    /// Hex sha256 of the canonical JSON of the key with no private part.
    /// Metadata refers to keys by this id.
    pub fn key_id(&self) -> String {
        let public = serde_json::json!({
            "keytype": self.keytype,
            "keyval": { "private": null, "public": self.keyval.public },
        });
        hex::encode(Sha256::digest(canonical_json(&public)))
    }

    fn verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        let raw = STANDARD
            .decode(&self.keyval.public)
            .map_err(|e| KeyError::MalformedKey(format!("not base64: {e}")))?;
        let key = match self.keytype.as_str() {
            ECDSA_KEY => p256::PublicKey::from_public_key_der(&raw)
                .map_err(|e| KeyError::MalformedKey(e.to_string()))?,
            ECDSA_X509_KEY => {
                let certificate = Certificate::from_pem(&raw)
                    .map_err(|e| KeyError::MalformedKey(format!("certificate: {e}")))?;
                let spki = &certificate.tbs_certificate.subject_public_key_info;
                p256::PublicKey::from_sec1_bytes(spki.subject_public_key.raw_bytes())
                    .map_err(|e| KeyError::MalformedKey(format!("certificate key: {e}")))?
            }
            other => return Err(KeyError::UnsupportedKeyType(other.into())),
        };
        Ok(VerifyingKey::from(&key))
    }

    /// Verify a base64 `sig` made with `method` over `message`.
    pub fn verify(&self, method: &str, message: &[u8], sig: &str) -> Result<(), KeyError> {
        if method != ECDSA_METHOD {
            return Err(KeyError::UnsupportedMethod(method.into()));
        }
        let verifying_key = self.verifying_key()?;
        let raw = STANDARD
            .decode(sig)
            .map_err(|e| KeyError::MalformedSignature(format!("not base64: {e}")))?;
        let signature =
            Signature::from_slice(&raw).map_err(|e| KeyError::MalformedSignature(e.to_string()))?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| KeyError::BadSignature)
    }
}

/// Canonical JSON bytes of `value`.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out.into_bytes()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' | '>' | '&' | '\u{2028}' | '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32))
            }
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    // P-256 key and signature produced with an independent ECDSA
    // implementation over `SIGNED_MESSAGE`.
    const SPKI: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEAhfmF/C2RDkoJ4+WmZ5pojpPLBUr321s32bluAKC1O0ZSn3ry5dxLS3aPKhaqHZaVvRfx1hZllLyiXxlMG5XlA==";
    const SPKI_KEY_ID: &str = "a37c4cdcb0c06c8e9e7acc852524a56791293cbbef26393a57c7a92755242ac0";
    const SIGNED_MESSAGE: &str =
        r#"{"_type":"Targets","expires":"2099-01-01T00:00:00Z","targets":{},"version":1}"#;
    const SIGNATURE: &str = "2X6J9l3H4kXpVLWr6R/IX8rmOjhpRD7iGGn3IPS1DtEO3OzOKN8FXE2rpLlwUYEAmNHX6hL6pK6JgJZwfffTPA==";

    // Self-signed certificate over the same key.
    const CERTIFICATE: &str = "LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0tCk1JSUJOVENCMjZBREFnRUNBZ0VCTUFvR0NDcUdTTTQ5QkFNQ01DTXhJVEFmQmdOVkJBTU1HSEpsWjJsemRISjUKTG1WNFlXMXdiR1V1WTI5dEwyRndjREFnRncweU1EQXhNREV3TURBd01EQmFHQTh5TURrNU1ERXdNVEF3TURBdwpNRm93SXpFaE1COEdBMVVFQXd3WWNtVm5hWE4wY25rdVpYaGhiWEJzWlM1amIyMHZZWEJ3TUZrd0V3WUhLb1pJCnpqMENBUVlJS29aSXpqMERBUWNEUWdBRUFoZm1GL0MyUkRrb0o0K1dtWjVwb2pwUExCVXIzMjFzMzJibHVBS0MKMU8wWlNuM3J5NWR4TFMzYVBLaGFxSFphVnZSZngxaFpsbEx5aVh4bE1HNVhsREFLQmdncWhrak9QUVFEQWdOSgpBREJHQWlFQWpOUmpzbFNrMTI0VTFwYUpBQW8vbmtEc3F2MXpPMVZicUVROEpENTZjWmtDSVFDaXlvY2ViSFQxCkVRRW9ocXBMNngxNEJ5K2VXUjI2bDY4N3V4VVE2NmtKRWc9PQotLS0tLUVORCBDRVJUSUZJQ0FURS0tLS0tCg==";
    const CERTIFICATE_KEY_ID: &str =
        "ef1dea0e0dba4225e07a5b92fcaf157ad99058ad03789652ef1ba42fa68e2f9d";

    #[test]
    fn canonical_form() {
        let value = json!({"b": 1, "a": [true, null, "x<y\n\"q\""], "c": {"z": "", "y": -2}});
        assert_eq!(
            String::from_utf8(canonical_json(&value)).unwrap(),
            r#"{"a":[true,null,"x\u003cy\n\"q\""],"b":1,"c":{"y":-2,"z":""}}"#
        );
    }

    #[rstest]
    #[case(ECDSA_KEY, "AAAA", "fb3530213bcf3f24edd7785c3ab973ade0f94977d5fd617247c34301aa4c1abb")]
    #[case(ECDSA_KEY, SPKI, SPKI_KEY_ID)]
    #[case(ECDSA_X509_KEY, CERTIFICATE, CERTIFICATE_KEY_ID)]
    fn key_ids(#[case] keytype: &str, #[case] public: &str, #[case] id: &str) {
        assert_eq!(PublicKey::new(keytype, public.into()).key_id(), id);
    }

    #[rstest]
    #[case(ECDSA_KEY, SPKI)]
    #[case(ECDSA_X509_KEY, CERTIFICATE)]
    fn verifies_ecdsa_signature(#[case] keytype: &str, #[case] public: &str) {
        let key = PublicKey::new(keytype, public.into());
        key.verify(ECDSA_METHOD, SIGNED_MESSAGE.as_bytes(), SIGNATURE)
            .unwrap();

        let tampered = SIGNED_MESSAGE.replace("2099", "2098");
        assert!(matches!(
            key.verify(ECDSA_METHOD, tampered.as_bytes(), SIGNATURE),
            Err(KeyError::BadSignature)
        ));
    }

    #[test]
    fn rejects_unsupported_input() {
        let key = PublicKey::new(ECDSA_KEY, SPKI.into());
        let message = SIGNED_MESSAGE.as_bytes();
        assert!(matches!(
            key.verify("rsapss", message, SIGNATURE),
            Err(KeyError::UnsupportedMethod(_))
        ));
        assert!(matches!(
            key.verify(ECDSA_METHOD, message, &STANDARD.encode("forged by attacker")),
            Err(KeyError::MalformedSignature(_))
        ));
        assert!(matches!(
            PublicKey::new("ed25519", SPKI.into()).verify(ECDSA_METHOD, message, SIGNATURE),
            Err(KeyError::UnsupportedKeyType(_))
        ));
        assert!(matches!(
            PublicKey::new(ECDSA_KEY, "AAAA".into()).verify(ECDSA_METHOD, message, SIGNATURE),
            Err(KeyError::MalformedKey(_))
        ));
    }
}
